use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata,
};

/// Extracts text from a PDF, one [`Document`] per non-empty page.
#[derive(Debug, Clone)]
pub struct PdfLoader {
    pub max_file_size: u64,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl PdfLoader {
    #[must_use]
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

impl DocumentLoader for PdfLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>>
    {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            if !has_pdf_extension(&path) {
                return Err(DocumentError::UnsupportedFormat(path.display().to_string()));
            }

            let path = tokio::fs::canonicalize(&path).await?;

            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(DocumentError::FileTooLarge {
                    size: meta.len(),
                    limit: max_size,
                });
            }

            let source = path.display().to_string();
            let pages = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_by_pages(&path)
                    .map_err(|e| DocumentError::Pdf(e.to_string()))
            })
            .await
            .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

            let total = pages.len();
            let documents: Vec<Document> = pages
                .into_iter()
                .enumerate()
                .filter(|(_, text)| !text.trim().is_empty())
                .map(|(i, content)| Document {
                    content,
                    metadata: DocumentMetadata {
                        source: source.clone(),
                        content_type: "application/pdf".to_owned(),
                        extra: HashMap::from([("page".to_owned(), (i + 1).to_string())]),
                    },
                })
                .collect();

            tracing::debug!(
                %source,
                pages = total,
                non_empty = documents.len(),
                "extracted PDF text"
            );
            Ok(documents)
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_pdf_extension(Path::new("a/report.PDF")));
        assert!(has_pdf_extension(Path::new("report.pdf")));
        assert!(!has_pdf_extension(Path::new("report.txt")));
        assert!(!has_pdf_extension(Path::new("report")));
    }

    #[tokio::test]
    async fn rejects_non_pdf_extension() {
        let err = PdfLoader::default()
            .load(Path::new("notes.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = PdfLoader::default()
            .load(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Io(_)));
    }

    #[tokio::test]
    async fn oversized_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(&[0u8; 64]).unwrap();

        let err = PdfLoader::new(16).load(file.path()).await.unwrap_err();
        assert!(matches!(
            err,
            DocumentError::FileTooLarge { size: 64, limit: 16 }
        ));
    }

    #[tokio::test]
    async fn garbage_bytes_are_pdf_error() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"this is not a pdf").unwrap();

        let err = PdfLoader::default().load(file.path()).await.unwrap_err();
        // A parser panic surfaces as a join error wrapped in Io.
        assert!(matches!(err, DocumentError::Pdf(_) | DocumentError::Io(_)));
    }

    #[test]
    fn supports_pdf_only() {
        assert_eq!(PdfLoader::default().supported_extensions(), &["pdf"]);
    }
}
