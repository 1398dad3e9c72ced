//! Clone service: materialize one branch of a repository into scratch storage
//!
//! Each clone lives in its own temporary directory which is deleted when the
//! [`EphemeralClone`] is dropped, whatever path the caller leaves by.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("remote repository is empty")]
    EmptyRemote,

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("clone has no working tree")]
    NoWorktree,
}

/// A cloned repository whose files disappear on drop
#[derive(Debug)]
pub struct EphemeralClone {
    dir: TempDir,
    worktree: Option<PathBuf>,
}

impl EphemeralClone {
    /// Wrap a scratch directory whose root is the working tree
    pub fn new(dir: TempDir) -> Self {
        let worktree = Some(dir.path().to_path_buf());
        Self { dir, worktree }
    }

    /// Wrap a scratch directory with no checked-out files
    pub fn bare(dir: TempDir) -> Self {
        Self { dir, worktree: None }
    }

    pub fn scratch_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Root of the checked-out files
    pub fn worktree(&self) -> Result<&Path, CloneError> {
        self.worktree.as_deref().ok_or(CloneError::NoWorktree)
    }
}

/// Fetches a single branch of a repository
pub trait Cloner: Send + Sync {
    fn clone_branch(&self, url: &str, branch: &str) -> Result<EphemeralClone, CloneError>;
}

/// libgit2-backed cloner
#[derive(Debug, Clone, Default)]
pub struct GitCloner {
    scratch_root: Option<PathBuf>,
}

impl GitCloner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place scratch directories under `root` instead of the system temp dir
    /// (a tmpfs mount keeps clones in memory).
    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("random-source-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

/// Ask the remote for its advertised branches without fetching anything.
fn remote_has_branches(url: &str) -> Result<bool, git2::Error> {
    let mut remote = git2::Remote::create_detached(url)?;
    remote.connect(git2::Direction::Fetch)?;
    let has_heads = remote
        .list()?
        .iter()
        .any(|head| head.name().starts_with("refs/heads/"));
    remote.disconnect()?;
    Ok(has_heads)
}

impl Cloner for GitCloner {
    fn clone_branch(&self, url: &str, branch: &str) -> Result<EphemeralClone, CloneError> {
        if !remote_has_branches(url)? {
            return Err(CloneError::EmptyRemote);
        }

        let dir = self.scratch_dir()?;
        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");

        let mut builder = git2::build::RepoBuilder::new();
        builder
            .branch(branch)
            .remote_create(|repo, name, url| repo.remote_with_fetch(name, url, &refspec));

        tracing::debug!("Cloning {} ({}) into {}", url, branch, dir.path().display());
        let repo = builder.clone(url, dir.path())?;
        if repo.workdir().is_none() {
            return Ok(EphemeralClone::bare(dir));
        }
        drop(repo);
        Ok(EphemeralClone::new(dir))
    }
}
