//! Database schema definitions

/// SQL to create the repositories table
///
/// `name` holds the clone URL. A NULL `indexed_at` marks the repository as
/// pending.
pub const CREATE_REPOSITORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    branch TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    indexed_at TEXT
)
"#;

/// SQL to create the indexed_files table
pub const CREATE_INDEXED_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS indexed_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository_id INTEGER NOT NULL REFERENCES repositories(id),
    path TEXT NOT NULL,
    lines INTEGER NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_repositories_indexed_at ON repositories(indexed_at)",
    "CREATE INDEX IF NOT EXISTS idx_indexed_files_repository ON indexed_files(repository_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_REPOSITORIES_TABLE, CREATE_INDEXED_FILES_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
