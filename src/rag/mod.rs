//! Retrieval index over a folder of PDFs.
//!
//! ```text
//! <data_dir>/
//!   pdf_files/            source PDFs (copied in by add_pdf)
//!   vector_store/index.db chunk text + metadata + embeddings
//! ```
//!
//! One document is *resident*: its full page text is kept in memory for
//! page lookups. It is the most recently ingested PDF, or the first PDF in
//! the folder when an existing store is loaded.

pub mod loader;
pub mod splitter;
pub mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{IndexMode, RagConfig};
use crate::embeddings::Embedder;
use crate::error::AppError;

pub use loader::LoadedDocument;
pub use splitter::DocumentChunk;
pub use store::ScoredChunk;

use splitter::PageSplitter;
use store::VectorStore;

pub const PDF_DIR: &str = "pdf_files";
pub const STORE_DIR: &str = "vector_store";

/// Value returned for a requested page outside the resident document.
pub const PAGE_OUT_OF_RANGE: &str = "Page out of range.";
/// Value of the single `error` entry when no document is resident.
pub const NO_DOCUMENT_LOADED: &str = "No document is loaded in memory.";

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub file_name: String,
    pub pages: usize,
    pub chunks: usize,
    /// Chunks that were new to the store and had to be embedded.
    pub embedded: usize,
}

pub struct RagIndex {
    pdf_dir: PathBuf,
    store_dir: PathBuf,
    store: RwLock<Option<VectorStore>>,
    resident: RwLock<Option<LoadedDocument>>,
    embedder: Embedder,
    splitter: PageSplitter,
}

impl RagIndex {
    /// Bring the index up according to `config.index_mode`.
    ///
    /// Missing PDFs are not fatal: the index starts empty and `search`
    /// returns no hits until something is ingested.
    pub async fn open(
        data_dir: &Path,
        config: &RagConfig,
        embedder: Embedder,
    ) -> Result<Self, AppError> {
        let pdf_dir = data_dir.join(PDF_DIR);
        let store_dir = data_dir.join(STORE_DIR);
        tokio::fs::create_dir_all(&pdf_dir).await?;
        tokio::fs::create_dir_all(&store_dir).await?;

        let index = Self {
            pdf_dir,
            store_dir,
            store: RwLock::new(None),
            resident: RwLock::new(None),
            embedder,
            splitter: PageSplitter::new(config.chunk_size, config.chunk_overlap)?,
        };

        let mode = match config.index_mode {
            IndexMode::Auto if VectorStore::exists_in(&index.store_dir) => IndexMode::Load,
            IndexMode::Auto => IndexMode::Build,
            other => other,
        };
        match mode {
            IndexMode::Build => index.build_from_folder().await?,
            _ => index.load_existing().await?,
        }
        Ok(index)
    }

    async fn load_existing(&self) -> Result<(), AppError> {
        if !VectorStore::exists_in(&self.store_dir) {
            warn!(dir = %self.store_dir.display(), "no vector store found; index is empty");
            return Ok(());
        }
        let store = blocking({
            let dir = self.store_dir.clone();
            move || VectorStore::open(&dir)
        })
        .await?;
        let count = blocking({
            let store = store.clone();
            move || store.count()
        })
        .await?;
        *self.store.write().await = Some(store);
        info!(chunks = count, "vector store loaded");

        // First readable PDF in name order becomes resident.
        for pdf in self.list_pdfs().await? {
            match loader::load_pdf(&pdf).await {
                Ok(doc) => {
                    info!(file = %doc.file_name, pages = doc.page_count(), "resident document loaded");
                    *self.resident.write().await = Some(doc);
                    return Ok(());
                }
                Err(e) => warn!(file = %pdf.display(), error = %e, "skipping unreadable PDF"),
            }
        }
        warn!(dir = %self.pdf_dir.display(), "no readable PDF files; page lookups unavailable");
        Ok(())
    }

    async fn build_from_folder(&self) -> Result<(), AppError> {
        let pdfs = self.list_pdfs().await?;
        if pdfs.is_empty() {
            warn!(dir = %self.pdf_dir.display(), "no PDF files to index; index is empty");
            return Ok(());
        }

        info!(files = pdfs.len(), "building vector store from scratch");
        let store = blocking({
            let dir = self.store_dir.clone();
            move || VectorStore::create_fresh(&dir)
        })
        .await?;
        *self.store.write().await = Some(store);

        let mut indexed = 0usize;
        for pdf in &pdfs {
            match loader::load_pdf(pdf).await {
                Ok(doc) => {
                    self.ingest_document(doc).await?;
                    indexed += 1;
                }
                Err(e) => warn!(file = %pdf.display(), error = %e, "skipping unreadable PDF"),
            }
        }
        info!(
            indexed,
            skipped = pdfs.len() - indexed,
            embedder = self.embedder.name(),
            "vector store built"
        );
        Ok(())
    }

    /// Copy `path` into `pdf_files/` (unless a file of that name is already
    /// there), index it and make it the resident document.
    pub async fn add_pdf(&self, path: &Path) -> Result<IngestReport, AppError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| AppError::Index(format!("not a file path: {}", path.display())))?;
        let dest = self.pdf_dir.join(file_name);
        if !tokio::fs::try_exists(&dest).await? {
            tokio::fs::copy(path, &dest).await.map_err(|e| {
                AppError::Index(format!("copy {} → {}: {e}", path.display(), dest.display()))
            })?;
        }

        let doc = loader::load_pdf(&dest).await?;
        self.ingest_document(doc).await
    }

    /// [`add_pdf`](Self::add_pdf) each path in order. A file that cannot be
    /// copied or read is logged and skipped.
    pub async fn add_pdfs(&self, paths: &[PathBuf]) -> Vec<IngestReport> {
        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            match self.add_pdf(path).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable PDF"),
            }
        }
        reports
    }

    /// Split, embed and store an already-loaded document, then make it
    /// resident. Chunks already present in the store are not re-embedded.
    pub async fn ingest_document(&self, doc: LoadedDocument) -> Result<IngestReport, AppError> {
        let chunks = self.splitter.split(&doc);
        let store = self.store_or_create().await?;

        let ids: Vec<String> = chunks.iter().map(DocumentChunk::id).collect();
        let existing = blocking({
            let store = store.clone();
            move || store.existing_ids(&ids)
        })
        .await?;

        let fresh: Vec<DocumentChunk> =
            chunks.iter().filter(|c| !existing.contains(&c.id())).cloned().collect();
        let texts: Vec<String> = fresh.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        let rows: Vec<(DocumentChunk, Vec<f32>)> = fresh.into_iter().zip(vectors).collect();
        let embedded = rows.len();

        blocking(move || store.insert(&rows)).await?;

        let report = IngestReport {
            file_name: doc.file_name.clone(),
            pages: doc.page_count(),
            chunks: chunks.len(),
            embedded,
        };
        info!(
            file = %report.file_name,
            pages = report.pages,
            chunks = report.chunks,
            embedded = report.embedded,
            "document indexed"
        );
        *self.resident.write().await = Some(doc);
        Ok(report)
    }

    /// Top-`k` chunks most similar to `query`. Empty when nothing is indexed.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        let Some(store) = self.store.read().await.clone() else {
            debug!("search on empty index");
            return Ok(Vec::new());
        };
        let embedding = self.embedder.embed_query(query).await?;
        blocking(move || store.search(&embedding, k)).await
    }

    /// Text of each requested 1-based page of the resident document, keyed by
    /// the page number as given. Pages outside the document map to
    /// [`PAGE_OUT_OF_RANGE`]; with no resident document the result is a
    /// single `error` entry.
    pub async fn search_by_page(&self, pages: &[i64]) -> BTreeMap<String, String> {
        let resident = self.resident.read().await;
        let Some(doc) = resident.as_ref() else {
            return BTreeMap::from([("error".to_string(), NO_DOCUMENT_LOADED.to_string())]);
        };

        pages
            .iter()
            .map(|&page| {
                let text = usize::try_from(page)
                    .ok()
                    .filter(|&p| p >= 1)
                    .and_then(|p| doc.pages.get(p - 1))
                    .cloned()
                    .unwrap_or_else(|| PAGE_OUT_OF_RANGE.to_string());
                (page.to_string(), text)
            })
            .collect()
    }

    /// Path of a stored PDF, if `file_name` is a plain file name that exists
    /// in `pdf_files/`.
    pub async fn pdf_path(&self, file_name: &str) -> Option<PathBuf> {
        if file_name.is_empty()
            || file_name.contains(['/', '\\'])
            || file_name == "."
            || file_name == ".."
        {
            return None;
        }
        let path = self.pdf_dir.join(file_name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// File name of the resident document, if any.
    pub async fn resident_document(&self) -> Option<String> {
        self.resident.read().await.as_ref().map(|d| d.file_name.clone())
    }

    pub async fn chunk_count(&self) -> Result<usize, AppError> {
        match self.store.read().await.clone() {
            Some(store) => blocking(move || store.count()).await,
            None => Ok(0),
        }
    }

    async fn store_or_create(&self) -> Result<VectorStore, AppError> {
        let mut guard = self.store.write().await;
        if let Some(store) = guard.as_ref() {
            return Ok(store.clone());
        }
        let store = blocking({
            let dir = self.store_dir.clone();
            move || VectorStore::open(&dir)
        })
        .await?;
        *guard = Some(store.clone());
        Ok(store)
    }

    /// PDFs in `pdf_files/`, sorted by name.
    async fn list_pdfs(&self) -> Result<Vec<PathBuf>, AppError> {
        let mut entries = tokio::fs::read_dir(&self.pdf_dir).await?;
        let mut pdfs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_pdf = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            if is_pdf && entry.file_type().await?.is_file() {
                pdfs.push(path);
            }
        }
        pdfs.sort();
        Ok(pdfs)
    }
}

/// Run a synchronous store operation on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Index(format!("vector store task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embeddings;
    use tempfile::TempDir;

    async fn empty_index() -> (TempDir, RagIndex) {
        let temp = TempDir::new().unwrap();
        let cfg = Config::test_default(temp.path());
        let embedder = embeddings::build(&cfg.embeddings, None).unwrap();
        let index = RagIndex::open(temp.path(), &cfg.rag, embedder).await.unwrap();
        (temp, index)
    }

    fn ten_page_doc() -> LoadedDocument {
        LoadedDocument {
            file_name: "ml_notes.pdf".into(),
            pages: (1..=10).map(|p| format!("This is the text of page {p}.")).collect(),
        }
    }

    #[tokio::test]
    async fn empty_folder_gives_empty_index() {
        let (temp, index) = empty_index().await;
        assert!(index.search("anything", 3).await.unwrap().is_empty());
        assert_eq!(index.chunk_count().await.unwrap(), 0);
        assert!(temp.path().join(PDF_DIR).is_dir());
    }

    #[tokio::test]
    async fn page_lookup_is_one_based() {
        let (_temp, index) = empty_index().await;
        index.ingest_document(ten_page_doc()).await.unwrap();

        let pages = index.search_by_page(&[5]).await;
        assert_eq!(pages.get("5").map(String::as_str), Some("This is the text of page 5."));

        let pages = index.search_by_page(&[50, 0, -2, 1]).await;
        assert_eq!(pages["50"], PAGE_OUT_OF_RANGE);
        assert_eq!(pages["0"], PAGE_OUT_OF_RANGE);
        assert_eq!(pages["-2"], PAGE_OUT_OF_RANGE);
        assert_eq!(pages["1"], "This is the text of page 1.");
    }

    #[tokio::test]
    async fn no_resident_document_gives_single_error() {
        let (_temp, index) = empty_index().await;
        let pages = index.search_by_page(&[1, 2, 3]).await;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages["error"], NO_DOCUMENT_LOADED);
    }

    #[tokio::test]
    async fn reingest_does_not_reembed() {
        let (_temp, index) = empty_index().await;
        let first = index.ingest_document(ten_page_doc()).await.unwrap();
        assert_eq!(first.embedded, first.chunks);
        let second = index.ingest_document(ten_page_doc()).await.unwrap();
        assert_eq!(second.chunks, first.chunks);
        assert_eq!(second.embedded, 0);
        assert_eq!(index.chunk_count().await.unwrap(), first.chunks);
    }

    #[tokio::test]
    async fn search_finds_matching_page() {
        let (_temp, index) = empty_index().await;
        index
            .ingest_document(LoadedDocument {
                file_name: "svm.pdf".into(),
                pages: vec![
                    "Gradient descent minimises a loss function.".into(),
                    "Support vector machines find a maximum margin hyperplane.".into(),
                ],
            })
            .await
            .unwrap();
        let hits = index.search("support vector machines margin", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.page, 1);
        assert_eq!(hits[0].chunk.source, "svm.pdf");
        assert_eq!(index.resident_document().await.as_deref(), Some("svm.pdf"));
    }

    #[tokio::test]
    async fn pdf_path_rejects_traversal() {
        let (temp, index) = empty_index().await;
        std::fs::write(temp.path().join(PDF_DIR).join("a.pdf"), b"%PDF").unwrap();
        assert!(index.pdf_path("a.pdf").await.is_some());
        assert!(index.pdf_path("missing.pdf").await.is_none());
        assert!(index.pdf_path("../a.pdf").await.is_none());
        assert!(index.pdf_path("..").await.is_none());
    }
}
