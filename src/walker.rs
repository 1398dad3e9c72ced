//! File walker: find candidate source files in a cloned working tree

use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;
use walkdir::WalkDir;

/// Extensions indexed when no override is configured
pub const DEFAULT_EXTENSIONS: &[&str] = &["js", "ts", "go", "py", "java", "html", "svelte", "css", "scss"];

/// An opened candidate file waiting for extraction
#[derive(Debug)]
pub struct FileJob {
    /// Path relative to the working tree root, `/`-separated
    pub path: String,
    pub file: File,
}

/// Walks a tree and yields files with an allowed extension.
///
/// Entries whose name starts with `.` are skipped; for directories the whole
/// subtree is skipped.
#[derive(Debug, Clone)]
pub struct FileWalker {
    extensions: Vec<String>,
}

impl Default for FileWalker {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }
}

impl FileWalker {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    /// Exact, case-sensitive extension match. Files without one never match.
    pub fn accepts(&self, file_name: &OsStr) -> bool {
        let ext = match Path::new(file_name).extension().and_then(OsStr::to_str) {
            Some(ext) if !ext.is_empty() => ext,
            _ => return false,
        };
        self.extensions.iter().any(|allowed| allowed == ext)
    }

    /// Walk `root`, handing every opened candidate to `emit`.
    ///
    /// Candidates that fail to open, or whose path is not valid UTF-8, are
    /// dropped. The first traversal error
    /// stops the walk and is returned. Returns the number of files emitted.
    pub fn walk(&self, root: &Path, mut emit: impl FnMut(FileJob)) -> Result<usize, walkdir::Error> {
        let mut emitted = 0;
        let entries = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_reserved(e.file_name()));

        for entry in entries {
            let entry = entry?;
            if !entry.file_type().is_file() || !self.accepts(entry.file_name()) {
                continue;
            }

            let Some(path) = relative_path(root, entry.path()) else {
                tracing::debug!("Skipping non UTF-8 path {:?}", entry.path());
                continue;
            };
            match File::open(entry.path()) {
                Ok(file) => {
                    emit(FileJob { path, file });
                    emitted += 1;
                }
                Err(e) => tracing::debug!("Skipping unreadable file {}: {}", path, e),
            }
        }

        Ok(emitted)
    }
}

fn is_reserved(name: &OsStr) -> bool {
    name.as_encoded_bytes().starts_with(b".")
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
