//! Extraction worker pool
//!
//! A fixed number of workers drain a bounded queue of opened files, writing
//! one metadata row and one content blob per file.

use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use crossbeam::channel::{self, Receiver, Sender};
use crate::storage::{BlobStore, Catalog, IndexedFile};
use crate::walker::FileJob;
use crate::Result;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Count `\n` bytes from the reader's current position to EOF
pub fn count_lines<R: Read>(reader: R) -> io::Result<i64> {
    let mut reader = BufReader::new(reader);
    let mut lines = 0i64;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(lines);
        }
        lines += buf.iter().filter(|&&b| b == b'\n').count() as i64;
        let len = buf.len();
        reader.consume(len);
    }
}

/// Extract one file: count lines, record metadata, copy the bytes to a blob.
///
/// The blob only becomes visible once fully written. If copying fails the
/// metadata row stays behind without a blob.
pub fn extract_file(catalog: &Catalog, blobs: &BlobStore, repository_id: i64, job: FileJob) -> Result<IndexedFile> {
    let FileJob { path, mut file } = job;

    let lines = count_lines(&mut file)?;
    file.seek(SeekFrom::Start(0))?;

    let id = catalog.add_indexed_file(repository_id, &path, lines)?;

    let mut blob = blobs.begin(id)?;
    io::copy(&mut file, &mut blob)?;
    blob.commit()?;

    Ok(IndexedFile { id, repository_id, path, lines })
}

fn worker_loop(jobs: Receiver<FileJob>, catalog: &Catalog, blobs: &BlobStore, repository_id: i64) -> usize {
    let mut extracted = 0;
    for job in jobs.iter() {
        let path = job.path.clone();
        match extract_file(catalog, blobs, repository_id, job) {
            Ok(_) => extracted += 1,
            Err(e) => tracing::debug!("Dropping {}: {}", path, e),
        }
    }
    extracted
}

/// Fixed-width pool over a bounded job queue
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    queue_capacity: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_QUEUE_CAPACITY)
    }
}

impl WorkerPool {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_capacity,
        }
    }

    /// Start the workers, let `produce` fill the queue, then close the queue
    /// and wait for every worker to drain it.
    ///
    /// Returns the producer's value and the number of files fully extracted.
    pub fn run<T>(
        &self,
        catalog: &Catalog,
        blobs: &BlobStore,
        repository_id: i64,
        produce: impl FnOnce(&Sender<FileJob>) -> T,
    ) -> (T, usize) {
        let (tx, rx) = channel::bounded::<FileJob>(self.queue_capacity);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..self.workers)
                .map(|_| {
                    let rx = rx.clone();
                    s.spawn(move || worker_loop(rx, catalog, blobs, repository_id))
                })
                .collect();
            drop(rx);

            let produced = produce(&tx);
            drop(tx);

            let extracted = handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        tracing::error!("Extraction worker panicked");
                        0
                    })
                })
                .sum();
            (produced, extracted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn setup() -> (Catalog, TempDir, BlobStore, i64) {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.upsert_repository("r", "main", Utc::now()).unwrap();
        let repo_id = catalog.get_repository_by_name("r").unwrap().unwrap().id;
        let dir = TempDir::new().unwrap();
        let blobs = BlobStore::open(dir.path().join("indexes")).unwrap();
        (catalog, dir, blobs, repo_id)
    }

    fn job(dir: &TempDir, name: &str, content: &str) -> FileJob {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        FileJob { path: name.to_string(), file: File::open(path).unwrap() }
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines(&b""[..]).unwrap(), 0);
        assert_eq!(count_lines(&b"no newline"[..]).unwrap(), 0);
        assert_eq!(count_lines(&b"a\nb\n"[..]).unwrap(), 2);
        assert_eq!(count_lines(&b"a\r\nb\r\nc"[..]).unwrap(), 2);
        assert_eq!(count_lines(&b"\n\n\n"[..]).unwrap(), 3);
    }

    #[test]
    fn test_extract_file_writes_row_and_blob() {
        let (catalog, dir, blobs, repo_id) = setup();
        let content = "package main\n\nfunc main() {}\n";

        let file = extract_file(&catalog, &blobs, repo_id, job(&dir, "main.go", content)).unwrap();

        assert_eq!(file.lines, 3);
        assert_eq!(file.path, "main.go");
        assert_eq!(blobs.read(file.id).unwrap(), content.as_bytes());
        assert_eq!(catalog.files_for_repository(repo_id).unwrap(), vec![file]);
    }

    #[test]
    fn test_blob_failure_leaves_metadata_only() {
        let (catalog, dir, blobs, repo_id) = setup();
        fs::remove_dir_all(blobs.root()).unwrap();

        let res = extract_file(&catalog, &blobs, repo_id, job(&dir, "a.py", "x = 1\n"));

        assert!(res.is_err());
        let rows = catalog.files_for_repository(repo_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!blobs.exists(rows[0].id));
    }

    #[test]
    fn test_metadata_failure_writes_no_blob() {
        let (catalog, dir, blobs, repo_id) = setup();
        catalog
            .execute_batch(
                "CREATE TRIGGER refuse_files BEFORE INSERT ON indexed_files
                 BEGIN SELECT RAISE(ABORT, 'catalog is read-only'); END;",
            )
            .unwrap();

        let res = extract_file(&catalog, &blobs, repo_id, job(&dir, "a.py", "x = 1\n"));

        assert!(matches!(res, Err(crate::Error::Storage(_))));
        assert!(catalog.files_for_repository(repo_id).unwrap().is_empty());
        assert_eq!(fs::read_dir(blobs.root()).unwrap().count(), 0);
    }

    #[test]
    fn test_pool_extracts_each_file_once_for_any_width() {
        for workers in [1, 3, 8] {
            let (catalog, dir, blobs, repo_id) = setup();
            let jobs: Vec<_> = (0..25)
                .map(|i| job(&dir, &format!("f{i}.js"), &"line\n".repeat(i)))
                .collect();

            let pool = WorkerPool::new(workers, 2);
            let (sent, extracted) = pool.run(&catalog, &blobs, repo_id, |tx| {
                let mut sent = 0;
                for j in jobs {
                    tx.send(j).unwrap();
                    sent += 1;
                }
                sent
            });

            assert_eq!(sent, 25);
            assert_eq!(extracted, 25);
            let rows = catalog.files_for_repository(repo_id).unwrap();
            assert_eq!(rows.len(), 25);
            for row in rows {
                let i: usize = row.path.trim_start_matches('f').trim_end_matches(".js").parse().unwrap();
                assert_eq!(row.lines, i as i64);
                assert_eq!(blobs.read(row.id).unwrap(), "line\n".repeat(i).as_bytes());
            }
        }
    }

    #[test]
    fn test_pool_with_no_jobs() {
        let (catalog, _dir, blobs, repo_id) = setup();
        let ((), extracted) = WorkerPool::default().run(&catalog, &blobs, repo_id, |_| ());
        assert_eq!(extracted, 0);
    }
}
