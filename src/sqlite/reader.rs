// ABOUTME: SQLite catalog introspection and paginated record extraction
// ABOUTME: Lists tables and columns, counts rows, and streams typed pages per table

use crate::records::{
    FilmWork, Genre, GenreFilmWork, Page, Person, PersonFilmWork, Record, Table,
};
use anyhow::{Context, Result};
use rusqlite::{Connection, Row};

/// List all user tables in a SQLite database
///
/// `sqlite_*` internal tables are skipped.
///
/// # Arguments
///
/// * `conn` - SQLite database connection
///
/// # Returns
///
/// Table names sorted alphabetically
///
/// # Examples
///
/// ```no_run
/// # use sqlite_to_postgres::sqlite::{open_sqlite, reader::list_tables};
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_sqlite("db.sqlite")?;
/// for table in list_tables(&conn)? {
///     println!("{}", table);
/// }
/// # Ok(())
/// # }
/// ```
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .context("Failed to prepare statement to list tables")?;

    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query table list")?
        .collect::<Result<Vec<String>, _>>()
        .context("Failed to collect table names")?;

    tracing::debug!("Found {} user tables in SQLite database", tables.len());

    Ok(tables)
}

/// Column names of a table in their physical order
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let query = format!("PRAGMA table_info(\"{}\")", table);
    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to get table info for '{}'", table))?;

    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .context("Failed to query table columns")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect column names")?;

    Ok(columns)
}

/// Whether a table can be addressed by `rowid`
///
/// Tables declared `WITHOUT ROWID` cannot, and the keyset page query would
/// fail on them with "no such column: rowid".
pub fn table_has_rowid(conn: &Connection, table: &str) -> bool {
    conn.prepare(&format!("SELECT rowid FROM \"{}\" LIMIT 0", table))
        .is_ok()
}

/// Row count of a catalog table
///
/// # Examples
///
/// ```no_run
/// # use sqlite_to_postgres::records::Table;
/// # use sqlite_to_postgres::sqlite::{open_sqlite, reader::get_table_row_count};
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_sqlite("db.sqlite")?;
/// let films = get_table_row_count(&conn, Table::FilmWork)?;
/// println!("{} film works", films);
/// # Ok(())
/// # }
/// ```
pub fn get_table_row_count(conn: &Connection, table: Table) -> Result<u64> {
    let query = format!("SELECT COUNT(*) FROM \"{}\"", table.name());

    let count: i64 = conn
        .query_row(&query, [], |row| row.get(0))
        .with_context(|| format!("Failed to count rows in table '{}'", table))?;

    Ok(count as u64)
}

/// Number of distinct conflict keys in a catalog table
///
/// Source rows that share a conflict key collapse onto one destination row,
/// so this is the number of destination rows the table accounts for after a
/// complete load. For tables keyed by `id` it equals the row count.
///
/// # Arguments
///
/// * `conn` - SQLite source connection
/// * `table` - Catalog table to count
///
/// # Returns
///
/// Count of distinct `table.conflict_key()` tuples
pub fn get_table_key_count(conn: &Connection, table: Table) -> Result<u64> {
    let key_columns = table
        .conflict_key()
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let query = format!(
        "SELECT COUNT(*) FROM (SELECT DISTINCT {} FROM \"{}\")",
        key_columns,
        table.name()
    );

    let count: i64 = conn
        .query_row(&query, [], |row| row.get(0))
        .with_context(|| format!("Failed to count distinct keys in table '{}'", table))?;

    Ok(count as u64)
}

fn record_from_row(table: Table, row: &Row<'_>) -> Result<Record> {
    Ok(match table {
        Table::Genre => Record::Genre(Genre::from_row(row)?),
        Table::Person => Record::Person(Person::from_row(row)?),
        Table::FilmWork => Record::FilmWork(FilmWork::from_row(row)?),
        Table::GenreFilmWork => Record::GenreFilmWork(GenreFilmWork::from_row(row)?),
        Table::PersonFilmWork => Record::PersonFilmWork(PersonFilmWork::from_row(row)?),
    })
}

fn page_query(table: Table) -> String {
    let columns = table
        .column_names()
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT rowid AS _rowid_, {} FROM \"{}\" WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
        columns,
        table.name()
    )
}

/// Reads every catalog table, in load order, as a sequence of pages
///
/// Each page is one keyset query (`rowid > last ORDER BY rowid LIMIT n`), so
/// no statement stays open on the connection between pages. A page shorter
/// than the page size ends its table without a further query; empty tables
/// produce no pages.
///
/// The extractor is single-pass. Once it yields an error it is exhausted.
///
/// # Examples
///
/// ```no_run
/// # use sqlite_to_postgres::sqlite::{open_sqlite, SqliteExtractor};
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_sqlite("db.sqlite")?;
/// for page in SqliteExtractor::new(&conn, 20) {
///     let page = page?;
///     println!("{} rows from {}", page.len(), page.table);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SqliteExtractor<'c> {
    conn: &'c Connection,
    page_size: usize,
    position: usize,
    last_rowid: i64,
    queries: usize,
    finished: bool,
}

impl<'c> SqliteExtractor<'c> {
    pub fn new(conn: &'c Connection, page_size: usize) -> Self {
        Self {
            conn,
            page_size: page_size.max(1),
            position: 0,
            last_rowid: i64::MIN,
            queries: 0,
            finished: false,
        }
    }

    /// Number of page queries issued so far
    pub fn queries(&self) -> usize {
        self.queries
    }

    fn next_page(&mut self) -> Result<Option<Page>> {
        while let Some(&table) = Table::ALL.get(self.position) {
            let page = Page {
                table,
                records: self.read_page(table)?,
            };

            if page.len() < self.page_size {
                self.position += 1;
                self.last_rowid = i64::MIN;
            }

            if !page.is_empty() {
                tracing::debug!("Read page of {} rows from '{}'", page.len(), table);
                return Ok(Some(page));
            }
        }

        Ok(None)
    }

    fn read_page(&mut self, table: Table) -> Result<Vec<Record>> {
        let conn = self.conn;
        let query = page_query(table);

        let mut stmt = conn
            .prepare_cached(&query)
            .with_context(|| format!("Failed to prepare page query for table '{}'", table))?;

        let mut rows = stmt
            .query(rusqlite::params![self.last_rowid, self.page_size as i64])
            .with_context(|| format!("Failed to query rows from table '{}'", table))?;
        self.queries += 1;

        let mut records = Vec::with_capacity(self.page_size);
        while let Some(row) = rows
            .next()
            .with_context(|| format!("Failed to fetch row from table '{}'", table))?
        {
            let rowid: i64 = row.get(0)?;
            let record = record_from_row(table, row)
                .with_context(|| format!("Failed to convert row {} of table '{}'", rowid, table))?;
            records.push(record);
            self.last_rowid = rowid;
        }

        Ok(records)
    }
}

impl Iterator for SqliteExtractor<'_> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_page() {
            Ok(Some(page)) => Some(Ok(page)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
