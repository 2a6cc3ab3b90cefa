use std::fs;
use std::path::{Path, PathBuf};

use crate::embedding::domain::face_embedding::FaceEmbedding;
use crate::embedding::embedding_generator::FaceEmbedder;

/// What happened to one file of a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum FileResult {
    /// The record's `path` is already set to the source key.
    Embedded(FaceEmbedding),
    NoFaces,
    Failed(String),
}

/// Runs the embedder over a batch of files.
///
/// This is a port; infrastructure provides the concrete scheduling.
pub trait BatchExecutor: Send {
    /// One result per input path, in input order.
    fn process(&mut self, batch: &[PathBuf]) -> Vec<FileResult>;
}

/// Identity of a source image in the index and in embedding records.
pub fn source_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Reads and embeds one file. Never panics on bad input.
pub fn embed_file(embedder: &mut dyn FaceEmbedder, path: &Path) -> FileResult {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => return FileResult::Failed(format!("read failed: {e}")),
    };
    match embedder.generate(&bytes) {
        Ok(Some(mut record)) => {
            record.path = source_key(path);
            FileResult::Embedded(record)
        }
        Ok(None) => FileResult::NoFaces,
        Err(e) => FileResult::Failed(e.to_string()),
    }
}
