use std::fmt;

use serde::Serialize;

/// An integrity problem found by `CacheStore::validate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CacheDefect {
    /// A file in the cache directory that is neither the index nor an embedding file.
    #[serde(rename_all = "camelCase")]
    InvalidFileName { file: String },
    #[serde(rename_all = "camelCase")]
    SourceMissing { path: String },
    #[serde(rename_all = "camelCase")]
    EmbeddingFileMissing { path: String, file: String },
    #[serde(rename_all = "camelCase")]
    MalformedPayload {
        path: String,
        file: String,
        reason: String,
    },
    /// A well-named embedding file that no index entry points at.
    #[serde(rename_all = "camelCase")]
    UnreferencedFile { file: String },
    /// The embedding file is named after a different content hash.
    #[serde(rename_all = "camelCase")]
    HashMismatch {
        path: String,
        file: String,
        expected: String,
    },
}

impl fmt::Display for CacheDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFileName { file } => write!(f, "foreign file in cache: {file}"),
            Self::SourceMissing { path } => write!(f, "source image missing: {path}"),
            Self::EmbeddingFileMissing { path, file } => {
                write!(f, "embedding file {file} missing for {path}")
            }
            Self::MalformedPayload { path, file, reason } => {
                write!(f, "embedding file {file} for {path} is malformed: {reason}")
            }
            Self::UnreferencedFile { file } => {
                write!(f, "embedding file {file} is not referenced by the index")
            }
            Self::HashMismatch {
                path,
                file,
                expected,
            } => write!(f, "embedding file {file} for {path} should be {expected}"),
        }
    }
}
