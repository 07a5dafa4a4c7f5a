pub mod error;
pub mod identity;
pub mod loader;
pub mod splitter;
pub mod types;

pub use error::DocumentError;
pub use identity::chunk_id;
pub use loader::PdfLoader;
pub use splitter::{SplitterConfig, TextSplitter};
pub use types::{Chunk, Document, DocumentMetadata};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

pub trait DocumentLoader: Send + Sync {
    /// Read `path` into one [`Document`] per non-empty page, in page order.
    fn load(
        &self,
        path: &std::path::Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>,
    >;

    fn supported_extensions(&self) -> &[&str];
}

/// Join page texts into the single text the splitter sees.
///
/// Pages are separated by a blank line so sentence-aware splitting treats a page
/// break as a paragraph break.
#[must_use]
pub fn concat_pages(pages: &[Document]) -> String {
    pages
        .iter()
        .map(|d| d.content.as_str())
        .filter(|c| !c.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
