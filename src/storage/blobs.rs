//! Flat directory of raw file contents, one `<id>.bin` per indexed file

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Use `root` as the blob directory, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: i64) -> PathBuf {
        self.root.join(format!("{id}.bin"))
    }

    /// Start writing the blob for `id`.
    ///
    /// Bytes go to a staging file in the blob directory. Nothing appears at
    /// [`BlobStore::path_for`] until [`BlobWriter::commit`]; a writer dropped
    /// without committing leaves no trace.
    pub fn begin(&self, id: i64) -> io::Result<BlobWriter> {
        Ok(BlobWriter {
            staging: NamedTempFile::new_in(&self.root)?,
            target: self.path_for(id),
        })
    }

    pub fn exists(&self, id: i64) -> bool {
        self.path_for(id).is_file()
    }

    pub fn read(&self, id: i64) -> io::Result<Vec<u8>> {
        std::fs::read(self.path_for(id))
    }

    /// Remove a blob, treating an already missing file as success
    pub fn remove(&self, id: i64) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(id)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// A blob being written; see [`BlobStore::begin`]
#[derive(Debug)]
pub struct BlobWriter {
    staging: NamedTempFile,
    target: PathBuf,
}

impl BlobWriter {
    /// Flush and move the staged bytes into place in one rename
    pub fn commit(mut self) -> io::Result<()> {
        self.staging.flush()?;
        self.staging.persist(&self.target)?;
        Ok(())
    }
}

impl Write for BlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.staging.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.staging.flush()
    }
}
