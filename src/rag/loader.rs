//! PDF → per-page text.

use std::path::Path;

use crate::error::AppError;

/// A PDF held in memory as one string per page (index 0 = page 1).
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    /// Base name of the source file, e.g. `main_notes.pdf`.
    pub file_name: String,
    pub pages: Vec<String>,
}

impl LoadedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Extract the text of every page of the PDF at `path`.
///
/// `pdf-extract` is synchronous and CPU-bound, so it runs on the blocking pool.
/// It can panic on malformed input; the panic surfaces here as the task's
/// join error and is reported as [`AppError::Index`].
pub async fn load_pdf(path: &Path) -> Result<LoadedDocument, AppError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::Index(format!("not a file path: {}", path.display())))?;

    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned))
        .await
        .map_err(|e| AppError::Index(format!("pdf loader task failed: {e}")))?
        .map_err(|e| AppError::Index(format!("cannot extract text from {}: {e}", path.display())))?;

    Ok(LoadedDocument { file_name, pages })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_file_is_an_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();
        let err = load_pdf(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Index(_)));
    }

    #[tokio::test]
    async fn missing_file_errors() {
        assert!(load_pdf(Path::new("/nonexistent/notes.pdf")).await.is_err());
    }
}
