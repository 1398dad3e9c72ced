//! # random-source
//!
//! Builds a corpus of source files from one owner's public repositories and
//! serves a random file on demand.
//!
//! random-source provides:
//! - A repository catalog and flat content blob store
//! - Paginated sync of the owner's repository listing
//! - A single-flight indexing pipeline (clone, walk, extract)
//! - A random sampler backing the HTTP endpoint

pub mod storage;
pub mod source;
pub mod guard;
pub mod clone;
pub mod walker;
pub mod extract;
pub mod pipeline;
pub mod sampler;
pub mod server;
pub mod schedule;
pub mod config;

// Re-exports for convenient access
pub use storage::{BlobStore, Catalog, IndexedFile, Repository};
pub use source::{GitHubLister, RemoteRepo, RepoLister, SyncService};
pub use guard::RunGuard;
pub use clone::{CloneError, Cloner, GitCloner};
pub use pipeline::{Indexer, PassReport};
pub use sampler::Sampler;

/// Result type alias for random-source operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for random-source operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Listing decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Failed to walk files in {repository}: {source}")]
    Walk {
        repository: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("No indexed files available")]
    EmptyCatalog,

    #[error("Blob missing for indexed file {0}")]
    BlobMissing(i64),
}
