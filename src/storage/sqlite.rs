//! SQLite storage implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, OptionalExtension};
use crate::Result;
use super::schema;

/// A known remote repository and its indexing state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: i64,
    /// Clone URL, unique across the catalog
    pub name: String,
    pub branch: String,
    pub updated_at: DateTime<Utc>,
    /// `None` while the repository is waiting to be indexed
    pub indexed_at: Option<DateTime<Utc>>,
}

impl Repository {
    pub fn is_pending(&self) -> bool {
        self.indexed_at.is_none()
    }
}

/// Metadata for one extracted source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub id: i64,
    pub repository_id: i64,
    pub path: String,
    pub lines: i64,
}

/// SQLite-backed repository catalog
///
/// The connection sits behind a mutex so extraction workers can share one
/// catalog through an `Arc`.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panicking writer leaves no half-applied statement behind.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn();
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Repository Operations ==========

    /// Insert a repository keyed by clone URL, or update branch and
    /// `updated_at` if it is already known. `indexed_at` is never touched.
    pub fn upsert_repository(&self, name: &str, branch: &str, updated_at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT INTO repositories (name, branch, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                branch = excluded.branch,
                updated_at = excluded.updated_at
            "#,
            params![name, branch, updated_at],
        )?;
        Ok(())
    }

    /// Get the pending repository with the smallest id greater than `after_id`
    pub fn next_pending(&self, after_id: i64) -> Result<Option<Repository>> {
        let repo = self.conn()
            .query_row(
                r#"
                SELECT id, name, branch, updated_at, indexed_at FROM repositories
                WHERE indexed_at IS NULL AND id > ?1
                ORDER BY id
                LIMIT 1
                "#,
                params![after_id],
                row_to_repository,
            )
            .optional()?;
        Ok(repo)
    }

    pub fn get_repository_by_name(&self, name: &str) -> Result<Option<Repository>> {
        let repo = self.conn()
            .query_row(
                "SELECT id, name, branch, updated_at, indexed_at FROM repositories WHERE name = ?1",
                params![name],
                row_to_repository,
            )
            .optional()?;
        Ok(repo)
    }

    pub fn list_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, branch, updated_at, indexed_at FROM repositories ORDER BY id",
        )?;
        let repos = stmt
            .query_map([], row_to_repository)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(repos)
    }

    /// Permanently delete a repository row
    pub fn remove_repository(&self, id: i64) -> Result<()> {
        self.conn().execute("DELETE FROM repositories WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Record a completed pass over a repository
    pub fn mark_indexed(&self, id: i64, indexed_at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE repositories SET indexed_at = ?1 WHERE id = ?2",
            params![indexed_at, id],
        )?;
        Ok(())
    }

    // ========== Indexed File Operations ==========

    /// Insert file metadata and return the generated id
    pub fn add_indexed_file(&self, repository_id: i64, path: &str, lines: i64) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO indexed_files (repository_id, path, lines) VALUES (?1, ?2, ?3)",
            params![repository_id, path, lines],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn files_for_repository(&self, repository_id: i64) -> Result<Vec<IndexedFile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, repository_id, path, lines FROM indexed_files WHERE repository_id = ?1 ORDER BY id",
        )?;
        let files = stmt
            .query_map(params![repository_id], row_to_indexed_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Pick one indexed file uniformly at random, leaving out the
    /// `exclude_recent` most recently inserted rows. Falls back to the whole
    /// table when the window would be empty.
    pub fn random_indexed_file(&self, exclude_recent: u32) -> Result<Option<IndexedFile>> {
        let conn = self.conn();
        let windowed = conn
            .query_row(
                r#"
                SELECT id, repository_id, path, lines FROM indexed_files
                WHERE id <= (SELECT MAX(id) FROM indexed_files) - ?1
                ORDER BY RANDOM()
                LIMIT 1
                "#,
                params![exclude_recent],
                row_to_indexed_file,
            )
            .optional()?;
        if windowed.is_some() {
            return Ok(windowed);
        }

        let any = conn
            .query_row(
                "SELECT id, repository_id, path, lines FROM indexed_files ORDER BY RANDOM() LIMIT 1",
                [],
                row_to_indexed_file,
            )
            .optional()?;
        Ok(any)
    }

    // ========== Utility Operations ==========

    /// Get database statistics
    pub fn stats(&self) -> Result<CatalogStats> {
        let conn = self.conn();
        let repositories: i64 = conn.query_row("SELECT COUNT(*) FROM repositories", [], |r| r.get(0))?;
        let pending: i64 = conn.query_row(
            "SELECT COUNT(*) FROM repositories WHERE indexed_at IS NULL",
            [],
            |r| r.get(0),
        )?;
        let files: i64 = conn.query_row("SELECT COUNT(*) FROM indexed_files", [], |r| r.get(0))?;

        Ok(CatalogStats {
            repositories: repositories as usize,
            pending: pending as usize,
            files: files as usize,
        })
    }
}

fn row_to_repository(row: &rusqlite::Row) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        name: row.get(1)?,
        branch: row.get(2)?,
        updated_at: row.get(3)?,
        indexed_at: row.get(4)?,
    })
}

fn row_to_indexed_file(row: &rusqlite::Row) -> rusqlite::Result<IndexedFile> {
    Ok(IndexedFile {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        path: row.get(2)?,
        lines: row.get(3)?,
    })
}

/// Database statistics
#[derive(Debug, Clone, Copy)]
pub struct CatalogStats {
    pub repositories: usize,
    pub pending: usize,
    pub files: usize,
}

impl std::fmt::Display for CatalogStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Catalog Statistics:")?;
        writeln!(f, "  Repositories: {}", self.repositories)?;
        writeln!(f, "  Pending: {}", self.pending)?;
        writeln!(f, "  Indexed files: {}", self.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_upsert_inserts_then_updates_in_place() {
        let store = Catalog::open_in_memory().unwrap();

        store.upsert_repository("https://example.com/a.git", "main", ts(10)).unwrap();
        store.upsert_repository("https://example.com/a.git", "trunk", ts(20)).unwrap();

        let repos = store.list_repositories().unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].branch, "trunk");
        assert_eq!(repos[0].updated_at, ts(20));
        assert!(repos[0].is_pending());
    }

    #[test]
    fn test_upsert_keeps_indexed_at() {
        let store = Catalog::open_in_memory().unwrap();

        store.upsert_repository("r", "main", ts(10)).unwrap();
        let id = store.get_repository_by_name("r").unwrap().unwrap().id;
        store.mark_indexed(id, ts(100)).unwrap();
        store.upsert_repository("r", "main", ts(30)).unwrap();

        let repo = store.get_repository_by_name("r").unwrap().unwrap();
        assert_eq!(repo.indexed_at, Some(ts(100)));
        assert_eq!(repo.updated_at, ts(30));
    }

    #[test]
    fn test_next_pending_skips_indexed_and_earlier_ids() {
        let store = Catalog::open_in_memory().unwrap();
        for name in ["a", "b", "c"] {
            store.upsert_repository(name, "main", ts(0)).unwrap();
        }
        let a = store.get_repository_by_name("a").unwrap().unwrap();
        store.mark_indexed(a.id, ts(5)).unwrap();

        let first = store.next_pending(0).unwrap().unwrap();
        assert_eq!(first.name, "b");
        let second = store.next_pending(first.id).unwrap().unwrap();
        assert_eq!(second.name, "c");
        assert!(store.next_pending(second.id).unwrap().is_none());
    }

    #[test]
    fn test_remove_repository() {
        let store = Catalog::open_in_memory().unwrap();
        store.upsert_repository("gone", "main", ts(0)).unwrap();
        let id = store.get_repository_by_name("gone").unwrap().unwrap().id;

        store.remove_repository(id).unwrap();

        assert!(store.get_repository_by_name("gone").unwrap().is_none());
        assert!(store.next_pending(0).unwrap().is_none());
    }

    #[test]
    fn test_indexed_file_ids_are_distinct() {
        let store = Catalog::open_in_memory().unwrap();
        store.upsert_repository("r", "main", ts(0)).unwrap();
        let repo = store.get_repository_by_name("r").unwrap().unwrap();

        let a = store.add_indexed_file(repo.id, "src/a.go", 3).unwrap();
        let b = store.add_indexed_file(repo.id, "src/b.go", 7).unwrap();
        assert_ne!(a, b);

        let files = store.files_for_repository(repo.id).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].lines, 7);
    }

    #[test]
    fn test_random_on_empty_table() {
        let store = Catalog::open_in_memory().unwrap();
        assert!(store.random_indexed_file(50).unwrap().is_none());
    }

    #[test]
    fn test_random_excludes_recent_rows() {
        let store = Catalog::open_in_memory().unwrap();
        store.upsert_repository("r", "main", ts(0)).unwrap();
        let repo = store.get_repository_by_name("r").unwrap().unwrap();
        let first = store.add_indexed_file(repo.id, "old.py", 1).unwrap();
        for i in 0..5 {
            store.add_indexed_file(repo.id, &format!("new{i}.py"), 1).unwrap();
        }

        for _ in 0..20 {
            let picked = store.random_indexed_file(5).unwrap().unwrap();
            assert_eq!(picked.id, first);
        }
    }

    #[test]
    fn test_random_falls_back_when_window_empty() {
        let store = Catalog::open_in_memory().unwrap();
        store.upsert_repository("r", "main", ts(0)).unwrap();
        let repo = store.get_repository_by_name("r").unwrap().unwrap();
        store.add_indexed_file(repo.id, "only.js", 1).unwrap();

        assert!(store.random_indexed_file(50).unwrap().is_some());
    }

    #[test]
    fn test_stats() {
        let store = Catalog::open_in_memory().unwrap();
        store.upsert_repository("a", "main", ts(0)).unwrap();
        store.upsert_repository("b", "main", ts(0)).unwrap();
        let a = store.get_repository_by_name("a").unwrap().unwrap();
        store.mark_indexed(a.id, ts(1)).unwrap();
        store.add_indexed_file(a.id, "x.ts", 2).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.repositories, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.files, 1);
    }
}
