// ABOUTME: SQLite source access for the catalog load
// ABOUTME: Validates the source file path, opens it read-only, and checks the column contract

pub mod converter;
pub mod reader;

pub use reader::SqliteExtractor;

use crate::records::Table;
use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

const SQLITE_EXTENSIONS: [&str; 3] = ["db", "sqlite", "sqlite3"];

/// Resolve the configured source path to an existing SQLite file
///
/// The path must name a regular file with a `.db`, `.sqlite` or `.sqlite3`
/// extension. Returns the canonical absolute path.
pub fn validate_sqlite_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("SQLITE_PATH cannot be empty");
    }

    let resolved = Path::new(path)
        .canonicalize()
        .with_context(|| format!("SQLite source '{}' does not exist or is not readable", path))?;

    if !resolved.is_file() {
        bail!("SQLite source '{}' is not a regular file", path);
    }

    let extension = resolved.extension().and_then(|ext| ext.to_str());
    if !extension.is_some_and(|ext| SQLITE_EXTENSIONS.contains(&ext)) {
        bail!(
            "SQLite source '{}' has an unexpected extension (expected one of: .{})",
            path,
            SQLITE_EXTENSIONS.join(", .")
        );
    }

    tracing::debug!("Resolved SQLite source to {}", resolved.display());
    Ok(resolved)
}

/// Open the source database in read-only mode
///
/// A trivial query runs right away so a corrupt file fails here rather than
/// in the middle of a load.
///
/// # Arguments
///
/// * `path` - Path to a `.db`, `.sqlite` or `.sqlite3` file
///
/// # Returns
///
/// A read-only connection. Pass it to [`close_sqlite`] when done.
///
/// # Examples
///
/// ```no_run
/// # use sqlite_to_postgres::sqlite::{close_sqlite, open_sqlite};
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_sqlite("db.sqlite")?;
/// // ... read from conn ...
/// close_sqlite(conn);
/// # Ok(())
/// # }
/// ```
pub fn open_sqlite(path: &str) -> Result<Connection> {
    let resolved = validate_sqlite_path(path)?;

    tracing::info!("Opening SQLite source {} (read-only)", resolved.display());

    let conn = Connection::open_with_flags(&resolved, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open SQLite source {}", resolved.display()))?;

    let version: String = conn
        .query_row("SELECT sqlite_version()", [], |row| row.get(0))
        .with_context(|| {
            format!(
                "SQLite source {} is not a readable database",
                resolved.display()
            )
        })?;
    tracing::debug!("SQLite library version {}", version);

    Ok(conn)
}

/// Close the source connection, logging instead of failing if SQLite refuses
pub fn close_sqlite(conn: Connection) {
    tracing::info!("Closing connection to SQLite database");
    if let Err((_conn, e)) = conn.close() {
        tracing::warn!("Failed to close SQLite connection cleanly: {}", e);
    }
}

/// Check that every catalog table exists in the source with every declared column
///
/// Columns are matched by name, so their physical order in the source does
/// not matter and extra source columns are ignored. Tables declared
/// `WITHOUT ROWID` are rejected because the reader pages by rowid. All
/// problems are reported together.
///
/// # Returns
///
/// `Ok(())` if the source can be loaded, otherwise one error listing every
/// missing table, missing column and unpageable table.
pub fn validate_source_schema(conn: &Connection) -> Result<()> {
    let tables = reader::list_tables(conn)?;
    let mut problems = Vec::new();

    for table in Table::ALL {
        if !tables.iter().any(|t| t == table.name()) {
            problems.push(format!("table '{}' is missing", table));
            continue;
        }

        if !reader::table_has_rowid(conn, table.name()) {
            problems.push(format!(
                "table '{}' is declared WITHOUT ROWID, which cannot be paged",
                table
            ));
        }

        let present = reader::table_columns(conn, table.name())?;
        let missing: Vec<&str> = table
            .column_names()
            .into_iter()
            .filter(|col| !present.iter().any(|p| p == col))
            .collect();

        if !missing.is_empty() {
            problems.push(format!(
                "table '{}' is missing column(s): {}",
                table,
                missing.join(", ")
            ));
        }
    }

    if !problems.is_empty() {
        bail!(
            "SQLite source does not match the catalog schema:\n  - {}",
            problems.join("\n  - ")
        );
    }

    tracing::debug!("SQLite source schema matches all {} tables", Table::ALL.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    pub(crate) const CATALOG_DDL: &str = "
        CREATE TABLE genre (id TEXT PRIMARY KEY, name TEXT NOT NULL, description TEXT,
            created TEXT, modified TEXT);
        CREATE TABLE person (id TEXT PRIMARY KEY, full_name TEXT NOT NULL,
            created TEXT, modified TEXT);
        CREATE TABLE film_work (id TEXT PRIMARY KEY, title TEXT NOT NULL, description TEXT,
            creation_date DATE, rating FLOAT, type TEXT NOT NULL, certificate TEXT,
            file_path TEXT, created TEXT, modified TEXT);
        CREATE TABLE genre_film_work (id TEXT PRIMARY KEY, film_work_id TEXT NOT NULL,
            genre_id TEXT NOT NULL, created TEXT);
        CREATE TABLE person_film_work (id TEXT PRIMARY KEY, film_work_id TEXT NOT NULL,
            person_id TEXT NOT NULL, role TEXT NOT NULL, created TEXT);
    ";

    #[test]
    fn test_validate_empty_path() {
        let err = validate_sqlite_path("").unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let err = validate_sqlite_path("/nonexistent/database.db").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_validate_no_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies");
        File::create(&path).unwrap();

        let err = validate_sqlite_path(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("unexpected extension"));
    }

    #[test]
    fn test_validate_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.csv");
        File::create(&path).unwrap();

        let err = validate_sqlite_path(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains(".db, .sqlite, .sqlite3"));
    }

    #[test]
    fn test_validate_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_sqlite_path(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn test_open_sqlite_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");
        Connection::open(&path)
            .unwrap()
            .execute_batch(CATALOG_DDL)
            .unwrap();

        let conn = open_sqlite(path.to_str().unwrap()).unwrap();
        let write = conn.execute("DELETE FROM genre", []);
        assert!(write
            .unwrap_err()
            .to_string()
            .to_lowercase()
            .contains("read"));
        close_sqlite(conn);
    }

    #[test]
    fn test_schema_matches() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CATALOG_DDL).unwrap();
        validate_source_schema(&conn).unwrap();
    }

    #[test]
    fn test_schema_ignores_column_order_and_extras() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CATALOG_DDL).unwrap();
        conn.execute_batch(
            "DROP TABLE genre;
             CREATE TABLE genre (modified TEXT, legacy_code INTEGER, name TEXT,
                 created TEXT, description TEXT, id TEXT PRIMARY KEY);",
        )
        .unwrap();
        validate_source_schema(&conn).unwrap();
    }

    #[test]
    fn test_schema_reports_missing_table_and_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CATALOG_DDL).unwrap();
        conn.execute_batch(
            "DROP TABLE person_film_work;
             DROP TABLE genre;
             CREATE TABLE genre (id TEXT PRIMARY KEY, title TEXT, created TEXT);",
        )
        .unwrap();

        let message = validate_source_schema(&conn).unwrap_err().to_string();
        assert!(message.contains("table 'person_film_work' is missing"));
        assert!(message.contains("table 'genre' is missing column(s): name, description, modified"));
    }

    #[test]
    fn test_schema_rejects_without_rowid_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CATALOG_DDL).unwrap();
        conn.execute_batch(
            "DROP TABLE person;
             CREATE TABLE person (id TEXT PRIMARY KEY, full_name TEXT NOT NULL,
                 created TEXT, modified TEXT) WITHOUT ROWID;",
        )
        .unwrap();

        let message = validate_source_schema(&conn).unwrap_err().to_string();
        assert!(message.contains("table 'person' is declared WITHOUT ROWID"));
    }
}
