//! Page-wise chunking with `text-splitter`.
//!
//! Each page is split independently so every chunk carries exactly one page
//! number. Same text + same policy ⇒ same chunks, same ids.

use sha2::{Digest, Sha256};
use text_splitter::{Characters, ChunkConfig, TextSplitter};

use super::loader::LoadedDocument;
use crate::error::AppError;

/// A span of text from one page of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub text: String,
    /// Source file base name.
    pub source: String,
    /// Zero-based page index.
    pub page: usize,
    /// Byte offset of the chunk within its page.
    pub position: usize,
}

impl DocumentChunk {
    /// Content-hash id: SHA-256 hex over source, page, position and text.
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update([0]);
        hasher.update(self.page.to_le_bytes());
        hasher.update(self.position.to_le_bytes());
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub struct PageSplitter {
    splitter: TextSplitter<Characters>,
}

impl PageSplitter {
    /// `chunk_size` and `overlap` are measured in characters.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, AppError> {
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(overlap)
            .map_err(|e| AppError::Config(format!("invalid chunk policy: {e}")))?;
        Ok(Self { splitter: TextSplitter::new(config) })
    }

    pub fn split(&self, doc: &LoadedDocument) -> Vec<DocumentChunk> {
        doc.pages
            .iter()
            .enumerate()
            .flat_map(|(page, text)| {
                self.splitter
                    .chunk_indices(text)
                    .filter(|(_, t)| !t.trim().is_empty())
                    .map(move |(position, t)| DocumentChunk {
                        text: t.to_string(),
                        source: doc.file_name.clone(),
                        page,
                        position,
                    })
            })
            .collect()
    }
}
