//! Random sampler for the serving path

use std::path::PathBuf;
use std::sync::Arc;
use crate::storage::{BlobStore, Catalog, IndexedFile};
use crate::{Error, Result};

/// Rows left out of sampling by default, newest first
pub const DEFAULT_EXCLUDE_RECENT: u32 = 50;

#[derive(Clone)]
pub struct Sampler {
    catalog: Arc<Catalog>,
    blobs: BlobStore,
    exclude_recent: u32,
}

impl Sampler {
    pub fn new(catalog: Arc<Catalog>, blobs: BlobStore) -> Self {
        Self {
            catalog,
            blobs,
            exclude_recent: DEFAULT_EXCLUDE_RECENT,
        }
    }

    pub fn with_exclude_recent(mut self, exclude_recent: u32) -> Self {
        self.exclude_recent = exclude_recent;
        self
    }

    /// Choose one indexed file and locate its blob.
    ///
    /// Fails with [`Error::EmptyCatalog`] when nothing is indexed and with
    /// [`Error::BlobMissing`] when the chosen row never got its content.
    pub fn pick(&self) -> Result<(IndexedFile, PathBuf)> {
        let file = self
            .catalog
            .random_indexed_file(self.exclude_recent)?
            .ok_or(Error::EmptyCatalog)?;

        let path = self.blobs.path_for(file.id);
        if !path.is_file() {
            return Err(Error::BlobMissing(file.id));
        }
        Ok((file, path))
    }

    /// Pick a file and read its whole contents
    pub fn sample(&self) -> Result<(IndexedFile, Vec<u8>)> {
        let (file, _) = self.pick()?;
        match self.blobs.read(file.id) {
            Ok(bytes) => Ok((file, bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::BlobMissing(file.id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Write;
    use tempfile::TempDir;

    fn setup() -> (Arc<Catalog>, TempDir, BlobStore, i64) {
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        catalog.upsert_repository("r", "main", Utc::now()).unwrap();
        let repo_id = catalog.get_repository_by_name("r").unwrap().unwrap().id;
        let dir = TempDir::new().unwrap();
        let blobs = BlobStore::open(dir.path()).unwrap();
        (catalog, dir, blobs, repo_id)
    }

    #[test]
    fn test_empty_catalog_is_an_error() {
        let (catalog, _dir, blobs, _) = setup();
        let sampler = Sampler::new(catalog, blobs);
        assert!(matches!(sampler.pick(), Err(Error::EmptyCatalog)));
    }

    #[test]
    fn test_missing_blob_is_an_error() {
        let (catalog, _dir, blobs, repo_id) = setup();
        let id = catalog.add_indexed_file(repo_id, "a.go", 1).unwrap();
        let sampler = Sampler::new(catalog, blobs);
        assert!(matches!(sampler.pick(), Err(Error::BlobMissing(missing)) if missing == id));
    }

    #[test]
    fn test_sample_returns_blob_bytes() {
        let (catalog, _dir, blobs, repo_id) = setup();
        let id = catalog.add_indexed_file(repo_id, "a.go", 1).unwrap();
        let mut w = blobs.begin(id).unwrap();
        w.write_all(b"package a\n").unwrap();
        w.commit().unwrap();

        let sampler = Sampler::new(catalog, blobs).with_exclude_recent(0);
        let (file, bytes) = sampler.sample().unwrap();
        assert_eq!(file.id, id);
        assert_eq!(bytes, b"package a\n");
    }

    #[test]
    fn test_in_flight_blob_is_never_served() {
        let (catalog, _dir, blobs, repo_id) = setup();
        let id = catalog.add_indexed_file(repo_id, "main.go", 3).unwrap();
        let mut writer = blobs.begin(id).unwrap();
        writer.write_all(b"package ").unwrap();

        // Default window: the only row is reached through the fallback.
        let sampler = Sampler::new(Arc::clone(&catalog), blobs.clone());
        assert!(matches!(sampler.pick(), Err(Error::BlobMissing(missing)) if missing == id));
        assert!(matches!(sampler.sample(), Err(Error::BlobMissing(missing)) if missing == id));

        // The row falls out of the recent window while its copy is still open.
        for i in 0..60 {
            let other = catalog.add_indexed_file(repo_id, &format!("f{i}.go"), 1).unwrap();
            let mut w = blobs.begin(other).unwrap();
            w.write_all(b"package f\n").unwrap();
            w.commit().unwrap();
        }
        for _ in 0..200 {
            match sampler.sample() {
                Ok((file, bytes)) => {
                    assert_ne!(file.id, id);
                    assert_eq!(bytes, b"package f\n");
                }
                Err(Error::BlobMissing(missing)) => assert_eq!(missing, id),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        writer.write_all(b"main\n\nfunc main() {}\n").unwrap();
        writer.commit().unwrap();
        let only_first = Sampler::new(catalog, blobs).with_exclude_recent(60);
        let (file, bytes) = only_first.sample().unwrap();
        assert_eq!(file.id, id);
        assert_eq!(bytes, b"package main\n\nfunc main() {}\n");
    }
}
