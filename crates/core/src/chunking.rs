use crate::error::IngestError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_SEPARATOR: &str = "\n";
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Pieces split by a regex separator are rejoined with this string.
const REGEX_JOINER: &str = " ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub separator: String,
    pub separator_is_regex: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            separator_is_regex: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.separator.is_empty() {
            return Err(IngestError::InvalidChunkConfig(
                "separator must not be empty".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn splitter(&self) -> Result<Regex, IngestError> {
        let pattern = if self.separator_is_regex {
            self.separator.clone()
        } else {
            regex::escape(&self.separator)
        };
        Ok(Regex::new(&pattern)?)
    }

    fn joiner(&self) -> &str {
        if self.separator_is_regex {
            REGEX_JOINER
        } else {
            &self.separator
        }
    }
}

/// Splits `text` into ordered, overlapping chunks of at most `chunk_size` characters.
///
/// The text is cut on the separator, consecutive pieces are packed greedily into a
/// window, and when a window overflows the trailing pieces (up to `chunk_overlap`
/// characters) are carried into the next one. A single piece longer than
/// `chunk_size` is cut into fixed character windows that overlap by `chunk_overlap`.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;
    let splitter = config.splitter()?;

    let pieces = splitter
        .split(text)
        .filter(|piece| !piece.is_empty())
        .flat_map(|piece| window_oversized(piece, config))
        .collect::<Vec<_>>();

    Ok(merge_pieces(pieces, config))
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn window_oversized(piece: &str, config: &ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = piece.chars().collect();
    if chars.len() <= config.chunk_size {
        return vec![piece.to_string()];
    }

    let step = config.chunk_size - config.chunk_overlap;
    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    windows
}

fn merge_pieces(pieces: Vec<String>, config: &ChunkingConfig) -> Vec<String> {
    let joiner = config.joiner();
    let joiner_len = char_len(joiner);

    let mut chunks = Vec::new();
    let mut window: VecDeque<(String, usize)> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let piece_len = char_len(&piece);
        let separator_cost = |window: &VecDeque<(String, usize)>| {
            if window.is_empty() {
                0
            } else {
                joiner_len
            }
        };

        if total + piece_len + separator_cost(&window) > config.chunk_size && !window.is_empty() {
            push_joined(&mut chunks, &window, joiner);

            while total > config.chunk_overlap
                || (total > 0
                    && total + piece_len + separator_cost(&window) > config.chunk_size)
            {
                let trailing_separator = if window.len() > 1 { joiner_len } else { 0 };
                match window.pop_front() {
                    Some((_, dropped_len)) => {
                        total = total.saturating_sub(dropped_len + trailing_separator);
                    }
                    None => {
                        total = 0;
                        break;
                    }
                }
            }
        }

        total += piece_len + separator_cost(&window);
        window.push_back((piece, piece_len));
    }

    push_joined(&mut chunks, &window, joiner);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<(String, usize)>, joiner: &str) {
    let joined = window
        .iter()
        .map(|(piece, _)| piece.as_str())
        .collect::<Vec<_>>()
        .join(joiner);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
            ..ChunkingConfig::default()
        }
    }

    #[test]
    fn defaults_match_line_splitting_policy() {
        let defaults = ChunkingConfig::default();
        assert_eq!(defaults.separator, "\n");
        assert_eq!(defaults.chunk_size, 1_000);
        assert_eq!(defaults.chunk_overlap, 200);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        let chunks = split_text("", &ChunkingConfig::default()).unwrap();
        assert!(chunks.is_empty());

        let chunks = split_text(" \n \n", &ChunkingConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn long_unbroken_text_is_windowed_with_overlap() {
        let text = "abcdefghij".repeat(250);
        assert_eq!(text.chars().count(), 2_500);

        let chunks = split_text(&text, &ChunkingConfig::default()).unwrap();
        let lengths = chunks.iter().map(|chunk| chunk.chars().count()).collect::<Vec<_>>();

        assert_eq!(lengths.len(), 3);
        assert_eq!(lengths[0], 1_000);
        assert_eq!(lengths[1], 1_000);
        assert!(lengths[2] >= 500);

        for pair in chunks.windows(2) {
            let tail = &pair[0][pair[0].len() - 200..];
            assert_eq!(&pair[1][..200], tail);
        }
    }

    #[test]
    fn lines_are_packed_and_tail_is_carried_over() {
        let chunks = split_text("aaa\nbbb\nccc\nddd", &config(10, 4)).unwrap();
        assert_eq!(chunks, vec!["aaa\nbbb", "bbb\nccc", "ccc\nddd"]);
    }

    #[test]
    fn short_text_stays_in_one_chunk() {
        let chunks = split_text("first line\nsecond line", &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks, vec!["first line\nsecond line"]);
    }

    #[test]
    fn lengths_are_counted_in_characters() {
        let text = "é".repeat(25);
        let chunks = split_text(&text, &config(10, 2)).unwrap();
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 10));
        assert_eq!(chunks[0].chars().count(), 10);
    }

    #[test]
    fn regex_separator_splits_on_pattern() {
        let config = ChunkingConfig {
            separator: r"\n{2,}".to_string(),
            separator_is_regex: true,
            chunk_size: 12,
            chunk_overlap: 0,
        };

        let chunks = split_text("alpha\n\n\nbeta\n\ngamma", &config).unwrap();
        assert_eq!(chunks, vec!["alpha beta", "gamma"]);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let result = split_text("text", &config(100, 100));
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }
}
