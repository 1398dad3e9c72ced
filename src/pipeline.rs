//! Pipeline driver
//!
//! One pass pulls pending repositories from the catalog one at a time,
//! clones each into scratch storage, walks it and feeds the worker pool.
//! Passes are single-flight per [`Indexer`].

use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use crate::clone::{CloneError, Cloner};
use crate::extract::WorkerPool;
use crate::guard::RunGuard;
use crate::storage::{BlobStore, Catalog, Repository};
use crate::walker::FileWalker;
use crate::{Error, Result};

/// Counts for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Repositories marked as indexed
    pub indexed: usize,
    /// Repositories deleted because the remote was empty
    pub removed: usize,
    /// Repositories left pending after a clone failure
    pub failed: usize,
    /// Files fully extracted
    pub files: usize,
}

pub struct Indexer {
    catalog: Arc<Catalog>,
    blobs: BlobStore,
    cloner: Box<dyn Cloner>,
    walker: FileWalker,
    pool: WorkerPool,
    guard: RunGuard,
}

impl Indexer {
    pub fn new(catalog: Arc<Catalog>, blobs: BlobStore, cloner: Box<dyn Cloner>) -> Self {
        Self {
            catalog,
            blobs,
            cloner,
            walker: FileWalker::default(),
            pool: WorkerPool::default(),
            guard: RunGuard::new(),
        }
    }

    pub fn with_walker(mut self, walker: FileWalker) -> Self {
        self.walker = walker;
        self
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Run one pass unless another is already in progress, in which case
    /// this returns `None` without doing anything.
    pub fn run(&self) -> Option<Result<PassReport>> {
        self.guard.run_exclusive(|| {
            let started = Instant::now();
            let res = self.run_pass();
            match &res {
                Ok(report) => tracing::info!(
                    "Pass finished in {:?}: {} indexed, {} removed, {} failed, {} files",
                    started.elapsed(),
                    report.indexed,
                    report.removed,
                    report.failed,
                    report.files
                ),
                Err(e) => tracing::error!("Pass aborted after {:?}: {}", started.elapsed(), e),
            }
            res
        })
    }

    fn run_pass(&self) -> Result<PassReport> {
        let mut report = PassReport::default();
        // Ids already attempted in this pass are never selected again, so a
        // repository that failed to clone waits for the next pass.
        let mut cursor = 0;

        while let Some(repo) = self.catalog.next_pending(cursor)? {
            cursor = repo.id;

            let clone = match self.cloner.clone_branch(&repo.name, &repo.branch) {
                Ok(clone) => clone,
                Err(CloneError::EmptyRemote) => {
                    tracing::info!("Removing empty repository {}", repo.name);
                    match self.catalog.remove_repository(repo.id) {
                        Ok(()) => report.removed += 1,
                        Err(e) => {
                            tracing::warn!("Failed to remove repository {}: {}", repo.name, e);
                            report.failed += 1;
                        }
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Failed to clone repository {}: {}", repo.name, e);
                    report.failed += 1;
                    continue;
                }
            };

            let worktree = match clone.worktree() {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Failed to get worktree for {}: {}", repo.name, e);
                    report.failed += 1;
                    continue;
                }
            };

            let files = self.index_worktree(&repo, worktree)?;
            report.files += files;

            self.catalog.mark_indexed(repo.id, Utc::now())?;
            report.indexed += 1;
            tracing::info!("Indexed {} ({} files)", repo.name, files);
        }

        Ok(report)
    }

    /// Walk the tree into the worker pool. A traversal error is returned only
    /// after every queued job has been drained.
    fn index_worktree(&self, repo: &Repository, worktree: &std::path::Path) -> Result<usize> {
        let (walked, extracted) = self.pool.run(&self.catalog, &self.blobs, repo.id, |jobs| {
            self.walker.walk(worktree, |job| {
                if let Err(e) = jobs.send(job) {
                    tracing::debug!("No worker left for {}", e.into_inner().path);
                }
            })
        });

        match walked {
            Ok(found) => {
                tracing::debug!("{}: {} candidates, {} extracted", repo.name, found, extracted);
                Ok(extracted)
            }
            Err(source) => Err(Error::Walk {
                repository: repo.name.clone(),
                source,
            }),
        }
    }
}
