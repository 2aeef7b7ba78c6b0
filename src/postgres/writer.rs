// ABOUTME: Chunked, idempotent inserts of catalog pages into PostgreSQL
// ABOUTME: Builds multi-row INSERT ... ON CONFLICT DO NOTHING statements and commits one chunk at a time

use super::connection::PostgresDestination;
use crate::records::{FieldValue, Page, Table};
use crate::utils::{qualified_table_name, quote_identifier};
use anyhow::{bail, Context, Result};
use std::future::Future;
use tokio_postgres::types::ToSql;

/// A single multi-row insert for one table
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: Table,
    pub sql: String,
    /// Row-major parameter values, `table.columns().len()` per row
    pub params: Vec<FieldValue>,
}

impl InsertStatement {
    pub fn row_count(&self) -> usize {
        self.params.len() / self.table.columns().len()
    }

    /// Parameter values grouped per row
    pub fn rows(&self) -> impl Iterator<Item = &[FieldValue]> {
        self.params.chunks(self.table.columns().len())
    }
}

/// Build `INSERT INTO "schema"."table" (...) VALUES (...), ... ON CONFLICT (...) DO NOTHING`
///
/// Columns and each row's placeholders follow the table's declared column
/// order. Conflicts on the table's unique key are skipped, which is what makes
/// re-running a load harmless; any other constraint violation still fails.
///
/// `schema` must already be a validated identifier.
///
/// # Arguments
///
/// * `schema` - Destination schema
/// * `table` - Table the rows belong to
/// * `rows` - Row values, each in the table's declared column order
///
/// # Examples
///
/// ```
/// # use sqlite_to_postgres::postgres::build_insert_statement;
/// # use sqlite_to_postgres::records::{FieldValue, Table};
/// let row = vec![
///     FieldValue::Uuid(uuid::Uuid::nil()),
///     FieldValue::Uuid(uuid::Uuid::nil()),
///     FieldValue::Uuid(uuid::Uuid::nil()),
///     FieldValue::Timestamp(chrono::Utc::now()),
/// ];
/// let statement = build_insert_statement("content", Table::GenreFilmWork, vec![row]);
/// assert!(statement.sql.ends_with("ON CONFLICT (\"film_work_id\", \"genre_id\") DO NOTHING"));
/// assert_eq!(statement.row_count(), 1);
/// ```
pub fn build_insert_statement(
    schema: &str,
    table: Table,
    rows: Vec<Vec<FieldValue>>,
) -> InsertStatement {
    let columns = table.column_names();
    let width = columns.len();

    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let conflict_list = table
        .conflict_key()
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut value_groups = Vec::with_capacity(rows.len());
    let mut params = Vec::with_capacity(rows.len() * width);

    for (idx, row) in rows.into_iter().enumerate() {
        debug_assert_eq!(row.len(), width);
        let base = idx * width;
        let placeholders = (1..=width)
            .map(|n| format!("${}", base + n))
            .collect::<Vec<_>>()
            .join(", ");
        value_groups.push(format!("({})", placeholders));
        params.extend(row);
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO NOTHING",
        qualified_table_name(schema, table.name()),
        column_list,
        value_groups.join(", "),
        conflict_list
    );

    InsertStatement { table, sql, params }
}

/// Where chunks go
///
/// `insert_chunk` must apply the statement as one committed unit of work
/// and return how many rows were actually inserted (conflicting rows do not
/// count).
pub trait Destination {
    fn insert_chunk(&mut self, statement: &InsertStatement) -> impl Future<Output = Result<u64>>;

    fn count_rows(&mut self, schema: &str, table: Table) -> impl Future<Output = Result<u64>>;
}

impl Destination for PostgresDestination {
    async fn insert_chunk(&mut self, statement: &InsertStatement) -> Result<u64> {
        let params: Vec<&(dyn ToSql + Sync)> =
            statement.params.iter().map(FieldValue::as_sql).collect();

        let transaction = self
            .client_mut()
            .transaction()
            .await
            .context("Failed to begin transaction")?;

        let inserted = transaction
            .execute(statement.sql.as_str(), &params)
            .await
            .context("INSERT was rejected by PostgreSQL")?;

        transaction
            .commit()
            .await
            .context("Failed to commit transaction")?;

        Ok(inserted)
    }

    async fn count_rows(&mut self, schema: &str, table: Table) -> Result<u64> {
        let query = format!(
            "SELECT COUNT(*) FROM {}",
            qualified_table_name(schema, table.name())
        );

        let row = self
            .client()
            .query_one(query.as_str(), &[])
            .await
            .with_context(|| format!("Failed to count rows in '{}.{}'", schema, table))?;

        let count: i64 = row.get(0);
        Ok(count as u64)
    }
}

/// Per-table load counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: Table,
    pub rows_read: u64,
    pub rows_inserted: u64,
    pub pages: usize,
    pub statements: usize,
}

/// Outcome of one load, one entry per table in load order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    tables: Vec<TableReport>,
}

impl Default for LoadReport {
    fn default() -> Self {
        Self {
            tables: Table::ALL
                .iter()
                .map(|&table| TableReport {
                    table,
                    rows_read: 0,
                    rows_inserted: 0,
                    pages: 0,
                    statements: 0,
                })
                .collect(),
        }
    }
}

impl LoadReport {
    pub fn tables(&self) -> &[TableReport] {
        &self.tables
    }

    pub fn table(&self, table: Table) -> &TableReport {
        &self.tables[table as usize]
    }

    fn table_mut(&mut self, table: Table) -> &mut TableReport {
        &mut self.tables[table as usize]
    }

    pub fn total_read(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_read).sum()
    }

    pub fn total_inserted(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_inserted).sum()
    }
}

/// Writes a stream of pages to a destination in fixed-size chunks
///
/// Rows are buffered per table and flushed whenever `chunk_size` rows are
/// pending, and once more when the table changes or input ends, so chunk
/// boundaries do not depend on page boundaries.
///
/// Pages must arrive in load order (`Table` ordering): once a table has been
/// left, neither it nor any earlier table may appear again. This is what
/// guarantees that junction rows are committed after the rows they reference.
pub struct BatchWriter<'d, D: Destination> {
    destination: &'d mut D,
    schema: String,
    chunk_size: usize,
    current: Option<Table>,
    pending: Vec<Vec<FieldValue>>,
    chunk_index: usize,
    report: LoadReport,
}

impl<'d, D: Destination> BatchWriter<'d, D> {
    pub fn new(destination: &'d mut D, schema: &str, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            destination,
            schema: schema.to_string(),
            chunk_size,
            current: None,
            pending: Vec::with_capacity(chunk_size),
            chunk_index: 0,
            report: LoadReport::default(),
        }
    }

    /// Consume every page, committing chunk by chunk
    ///
    /// Stops at the first reader or writer error. Chunks committed before the
    /// error stay committed.
    pub async fn save_all_data<I>(mut self, pages: I) -> Result<LoadReport>
    where
        I: IntoIterator<Item = Result<Page>>,
    {
        tracing::info!(
            "Starting to save all data into schema '{}', chunk_size={}",
            self.schema,
            self.chunk_size
        );

        for page in pages {
            self.write_page(page?).await?;
        }
        self.flush().await?;

        tracing::info!(
            "Data saved successfully: {} rows read, {} new rows inserted",
            self.report.total_read(),
            self.report.total_inserted()
        );

        Ok(self.report)
    }

    async fn write_page(&mut self, page: Page) -> Result<()> {
        match self.current {
            Some(current) if current == page.table => {}
            Some(current) if page.table < current => bail!(
                "Page for table '{}' arrived after table '{}'; tables must be loaded in order: {}",
                page.table,
                current,
                Table::ALL.map(|t| t.name()).join(", ")
            ),
            _ => {
                self.flush().await?;
                self.current = Some(page.table);
                self.chunk_index = 0;
            }
        }

        let table_report = self.report.table_mut(page.table);
        table_report.pages += 1;
        table_report.rows_read += page.len() as u64;

        for record in page.records {
            if record.table() != page.table {
                bail!(
                    "Record for table '{}' found in a page of table '{}'",
                    record.table(),
                    page.table
                );
            }
            let values = record.values();
            page.table.check_values(&values)?;
            self.pending.push(values);
            if self.pending.len() >= self.chunk_size {
                self.flush().await?;
            }
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let Some(table) = self.current else {
            return Ok(());
        };
        if self.pending.is_empty() {
            return Ok(());
        }

        let rows = std::mem::take(&mut self.pending);
        let row_count = rows.len();
        let statement = build_insert_statement(&self.schema, table, rows);

        tracing::debug!("SQL query: {}", statement.sql);

        let inserted = self
            .destination
            .insert_chunk(&statement)
            .await
            .with_context(|| {
                format!(
                    "Failed to insert chunk {} ({} rows) into '{}.{}'",
                    self.chunk_index, row_count, self.schema, table
                )
            })?;

        tracing::debug!(
            "Committed chunk {} of '{}': {} of {} rows new",
            self.chunk_index,
            table,
            inserted,
            row_count
        );

        let table_report = self.report.table_mut(table);
        table_report.statements += 1;
        table_report.rows_inserted += inserted;
        self.chunk_index += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{FilmWork, FilmWorkType, Genre, Record};
    use chrono::Utc;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingDestination {
        statements: Vec<InsertStatement>,
        fail_on_call: Option<usize>,
    }

    impl Destination for RecordingDestination {
        async fn insert_chunk(&mut self, statement: &InsertStatement) -> Result<u64> {
            if self.fail_on_call == Some(self.statements.len()) {
                bail!("insert or update violates foreign key constraint");
            }
            self.statements.push(statement.clone());
            Ok(statement.row_count() as u64)
        }

        async fn count_rows(&mut self, _schema: &str, table: Table) -> Result<u64> {
            Ok(self
                .statements
                .iter()
                .filter(|s| s.table == table)
                .map(|s| s.row_count() as u64)
                .sum())
        }
    }

    fn genre(n: usize) -> Record {
        Record::Genre(Genre {
            id: Uuid::new_v4(),
            name: format!("genre {}", n),
            description: None,
            created: Utc::now(),
            modified: Utc::now(),
        })
    }

    fn film(title: &str) -> Record {
        Record::FilmWork(FilmWork {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            creation_date: None,
            rating: Some(75.0),
            kind: FilmWorkType::Movie,
            certificate: None,
            file_path: None,
            created: Utc::now(),
            modified: Utc::now(),
        })
    }

    /// Split `count` genres into pages of `page_size`
    fn genre_pages(count: usize, page_size: usize) -> Vec<Result<Page>> {
        let records: Vec<Record> = (0..count).map(genre).collect();
        records
            .chunks(page_size)
            .map(|chunk| {
                Ok(Page {
                    table: Table::Genre,
                    records: chunk.to_vec(),
                })
            })
            .collect()
    }

    #[test]
    fn test_build_insert_statement_sql() {
        let rows = vec![genre(1).values(), genre(2).values()];
        let statement = build_insert_statement("content", Table::Genre, rows);

        assert_eq!(
            statement.sql,
            "INSERT INTO \"content\".\"genre\" (\"id\", \"name\", \"description\", \"created\", \"modified\") \
             VALUES ($1, $2, $3, $4, $5), ($6, $7, $8, $9, $10) \
             ON CONFLICT (\"id\") DO NOTHING"
        );
        assert_eq!(statement.params.len(), 10);
        assert_eq!(statement.row_count(), 2);
    }

    #[test]
    fn test_junction_statement_targets_composite_key() {
        let row = vec![
            FieldValue::Uuid(Uuid::new_v4()),
            FieldValue::Uuid(Uuid::new_v4()),
            FieldValue::Uuid(Uuid::new_v4()),
            FieldValue::Text(Some("actor".into())),
            FieldValue::Timestamp(Utc::now()),
        ];
        let statement = build_insert_statement("content", Table::PersonFilmWork, vec![row]);

        assert!(statement
            .sql
            .ends_with("ON CONFLICT (\"film_work_id\", \"person_id\", \"role\") DO NOTHING"));
    }

    #[test]
    fn test_values_bound_in_declared_order() {
        let record = film("X");
        let statement =
            build_insert_statement("content", Table::FilmWork, vec![record.values()]);

        let row = statement.rows().next().unwrap();
        let columns = Table::FilmWork.column_names();
        let at = |name: &str| &row[columns.iter().position(|c| *c == name).unwrap()];

        assert_eq!(at("title"), &FieldValue::Text(Some("X".into())));
        assert_eq!(at("rating"), &FieldValue::Float(Some(75.0)));
        assert_eq!(at("type"), &FieldValue::Text(Some("MV".into())));
        assert_eq!(at("creation_date"), &FieldValue::Date(None));
    }

    #[tokio::test]
    async fn test_25_rows_make_three_chunks() {
        let mut destination = RecordingDestination::default();
        let report = BatchWriter::new(&mut destination, "content", 10)
            .save_all_data(genre_pages(25, 20))
            .await
            .unwrap();

        let sizes: Vec<usize> = destination
            .statements
            .iter()
            .map(InsertStatement::row_count)
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);

        let genre = report.table(Table::Genre);
        assert_eq!(genre.pages, 2);
        assert_eq!(genre.statements, 3);
        assert_eq!(genre.rows_read, 25);
        assert_eq!(genre.rows_inserted, 25);
    }

    #[tokio::test]
    async fn test_chunks_span_pages() {
        let mut destination = RecordingDestination::default();
        BatchWriter::new(&mut destination, "content", 50)
            .save_all_data(genre_pages(45, 20))
            .await
            .unwrap();

        assert_eq!(destination.statements.len(), 1);
        assert_eq!(destination.statements[0].row_count(), 45);
    }

    #[tokio::test]
    async fn test_table_change_flushes_pending_rows() {
        let mut pages = genre_pages(3, 20);
        pages.push(Ok(Page {
            table: Table::FilmWork,
            records: vec![film("X"), film("Y")],
        }));

        let mut destination = RecordingDestination::default();
        BatchWriter::new(&mut destination, "content", 10)
            .save_all_data(pages)
            .await
            .unwrap();

        let tables: Vec<(Table, usize)> = destination
            .statements
            .iter()
            .map(|s| (s.table, s.row_count()))
            .collect();
        assert_eq!(tables, vec![(Table::Genre, 3), (Table::FilmWork, 2)]);
    }

    #[tokio::test]
    async fn test_rejects_out_of_order_tables() {
        let mut pages = vec![Ok(Page {
            table: Table::FilmWork,
            records: vec![film("X")],
        })];
        pages.extend(genre_pages(1, 20));

        let mut destination = RecordingDestination::default();
        let err = BatchWriter::new(&mut destination, "content", 10)
            .save_all_data(pages)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("must be loaded in order"));
    }

    #[tokio::test]
    async fn test_failing_chunk_names_table_and_index_and_stops() {
        let mut destination = RecordingDestination {
            fail_on_call: Some(1),
            ..Default::default()
        };
        let err = BatchWriter::new(&mut destination, "content", 10)
            .save_all_data(genre_pages(45, 20))
            .await
            .unwrap_err();

        let chain = format!("{:#}", err);
        assert!(chain.contains("chunk 1 (10 rows) into 'content.genre'"));
        assert!(chain.contains("foreign key"));
        assert_eq!(destination.statements.len(), 1);
    }

    #[tokio::test]
    async fn test_reader_error_stops_before_later_pages() {
        let mut pages = genre_pages(10, 10);
        pages.push(Err(anyhow::anyhow!("Failed to convert row 11 of table 'genre'")));
        pages.extend(genre_pages(10, 10));

        let mut destination = RecordingDestination::default();
        let err = BatchWriter::new(&mut destination, "content", 10)
            .save_all_data(pages)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("row 11"));
        assert_eq!(destination.statements.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut destination = RecordingDestination::default();
        let report = BatchWriter::new(&mut destination, "content", 10)
            .save_all_data(Vec::new())
            .await
            .unwrap();

        assert!(destination.statements.is_empty());
        assert_eq!(report.total_read(), 0);
        assert_eq!(report.tables().len(), Table::ALL.len());
    }
}
