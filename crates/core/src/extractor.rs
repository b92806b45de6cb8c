use crate::error::IngestError;
use crate::models::DocumentSource;
use lopdf::Document;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, source: &DocumentSource) -> Result<Vec<PageText>, IngestError>;

    /// Page texts concatenated without a separator.
    fn extract_text(&self, source: &DocumentSource) -> Result<String, IngestError> {
        let mut text = String::new();
        for page in self.extract_pages(source)? {
            debug!(
                document = %source.label(),
                page = page.number,
                chars = page.text.chars().count(),
                "extracted page"
            );
            text.push_str(&page.text);
        }
        Ok(text)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    fn open(source: &DocumentSource) -> Result<Document, IngestError> {
        let loaded = match source {
            DocumentSource::Path(path) => Document::load(path),
            DocumentSource::Bytes { data, .. } => Document::load_mem(data),
        };
        loaded.map_err(|error| IngestError::PdfParse(format!("{}: {error}", source.label())))
    }
}

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, source: &DocumentSource) -> Result<Vec<PageText>, IngestError> {
        let document = Self::open(source)?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(text) if !text.trim().is_empty() => pages.push(PageText {
                    number: page_no,
                    text,
                }),
                Ok(_) => {}
                Err(error) => {
                    debug!(document = %source.label(), page = page_no, %error, "page has no extractable text");
                }
            }
        }

        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct PagedExtractor {
        pages: Vec<&'static str>,
    }

    impl PdfExtractor for PagedExtractor {
        fn extract_pages(&self, _source: &DocumentSource) -> Result<Vec<PageText>, IngestError> {
            Ok(self
                .pages
                .iter()
                .enumerate()
                .map(|(index, text)| PageText {
                    number: index as u32 + 1,
                    text: text.to_string(),
                })
                .collect())
        }
    }

    #[test]
    fn page_texts_are_joined_without_separator() {
        let extractor = PagedExtractor {
            pages: vec!["first page.", "second page."],
        };
        let text = extractor
            .extract_text(&DocumentSource::from_bytes("doc.pdf", Vec::new()))
            .unwrap();
        assert_eq!(text, "first page.second page.");
    }

    #[test]
    fn garbage_bytes_fail_with_parse_error() {
        let source = DocumentSource::from_bytes("broken.pdf", b"%PDF-1.4\n%broken".to_vec());
        let result = LopdfExtractor.extract_pages(&source);
        assert!(matches!(result, Err(IngestError::PdfParse(message)) if message.contains("broken.pdf")));
    }

    #[test]
    fn missing_path_fails_with_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("absent.pdf");
        assert!(!path.exists());

        let result = LopdfExtractor.extract_pages(&DocumentSource::Path(path.clone()));
        assert!(result.is_err());

        fs::write(&path, b"not a pdf")?;
        let result = LopdfExtractor.extract_pages(&DocumentSource::Path(path));
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }
}
