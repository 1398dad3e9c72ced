//! Storage Layer - SQLite catalog plus flat blob directory
//!
//! System of record is SQLite with tables:
//! - repositories(id, name, branch, updated_at, indexed_at)
//! - indexed_files(id, repository_id, path, lines)
//!
//! Raw file contents live beside it as `<id>.bin` files.

pub mod schema;
pub mod sqlite;
pub mod blobs;

pub use sqlite::{Catalog, CatalogStats, IndexedFile, Repository};
pub use blobs::{BlobStore, BlobWriter};
