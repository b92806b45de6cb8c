use crate::extractor::PdfExtractor;
use crate::models::{DocumentSource, SkippedDocument};
use crate::IngestError;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn sources_from_folder(folder: &Path) -> Result<Vec<DocumentSource>, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "not a directory: {}",
            folder.display()
        )));
    }

    let files = discover_pdf_files(folder);
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    Ok(files.into_iter().map(DocumentSource::Path).collect())
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub text: String,
    pub documents_processed: usize,
    pub skipped: Vec<SkippedDocument>,
}

impl ExtractionReport {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Extracts every document in order, skipping the ones that fail to parse.
pub fn extract_documents(
    extractor: &dyn PdfExtractor,
    documents: &[DocumentSource],
) -> ExtractionReport {
    let mut report = ExtractionReport::default();

    for document in documents {
        match extractor.extract_text(document) {
            Ok(text) => {
                report.text.push_str(&text);
                report.documents_processed += 1;
            }
            Err(error) => {
                warn!(document = %document.label(), reason = %error, "skipped pdf");
                report.skipped.push(SkippedDocument {
                    label: document.label(),
                    reason: error.to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{LopdfExtractor, PageText};
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    struct FixedExtractor;

    impl PdfExtractor for FixedExtractor {
        fn extract_pages(&self, source: &DocumentSource) -> Result<Vec<PageText>, IngestError> {
            match source {
                DocumentSource::Bytes { data, .. } if data.starts_with(b"ok:") => {
                    Ok(vec![PageText {
                        number: 1,
                        text: String::from_utf8_lossy(&data[3..]).to_string(),
                    }])
                }
                _ => Err(IngestError::PdfParse(format!("cannot read {}", source.label()))),
            }
        }
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn folder_without_pdfs_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = sources_from_folder(dir.path());
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn failing_documents_are_skipped_and_the_rest_extracted() {
        let documents = vec![
            DocumentSource::from_bytes("one.pdf", b"ok:alpha ".to_vec()),
            DocumentSource::from_bytes("broken.pdf", b"garbage".to_vec()),
            DocumentSource::from_bytes("two.pdf", b"ok:beta".to_vec()),
        ];

        let report = extract_documents(&FixedExtractor, &documents);

        assert_eq!(report.text, "alpha beta");
        assert_eq!(report.documents_processed, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].label, "broken.pdf");
        assert!(report.has_text());
    }

    #[test]
    fn best_effort_skips_unreadable_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let documents = sources_from_folder(dir.path())?;
        let report = extract_documents(&LopdfExtractor, &documents);

        assert!(!report.has_text());
        assert_eq!(report.documents_processed, 0);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].label.ends_with("unreadable.pdf"));
        Ok(())
    }

    #[test]
    fn empty_batch_yields_empty_report() {
        let report = extract_documents(&FixedExtractor, &[]);
        assert!(!report.has_text());
        assert_eq!(report.documents_processed, 0);
    }
}
