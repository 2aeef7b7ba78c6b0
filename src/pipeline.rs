// ABOUTME: Pipeline driver wiring the SQLite extractor into the PostgreSQL writer
// ABOUTME: Owns both connections for one run and releases them on every exit path

use crate::config::Settings;
use crate::postgres::{self, BatchWriter, Destination, LoadReport};
use crate::records::Table;
use crate::sqlite::{self, reader, SqliteExtractor};
use anyhow::{bail, Result};
use rusqlite::Connection;

/// Knobs for a single load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub page_size: usize,
    pub chunk_size: usize,
    pub schema: String,
}

impl LoadOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            page_size: settings.load.page_size,
            chunk_size: settings.load.chunk_size,
            schema: settings.postgres.schema.clone(),
        }
    }
}

/// Copy every catalog table from an open SQLite connection into `destination`
///
/// The source schema is checked before anything is written. Pages are pulled
/// from the extractor only after the previous page's chunks have committed,
/// so at most one page plus one chunk is held in memory.
///
/// # Arguments
///
/// * `source` - Open SQLite connection holding the catalog tables
/// * `destination` - Where chunks are written, normally a `PostgresDestination`
/// * `options` - Page size, chunk size and destination schema
///
/// # Returns
///
/// Per-table counts of rows read, rows inserted, pages and statements
pub async fn load_from_sqlite<D: Destination>(
    source: &Connection,
    destination: &mut D,
    options: &LoadOptions,
) -> Result<LoadReport> {
    sqlite::validate_source_schema(source)?;

    for table in Table::ALL {
        let count = reader::get_table_row_count(source, table)?;
        tracing::info!("Source table '{}' has {} rows", table, count);
    }

    let mut extractor = SqliteExtractor::new(source, options.page_size);
    let report = BatchWriter::new(destination, &options.schema, options.chunk_size)
        .save_all_data(&mut extractor)
        .await?;
    tracing::debug!("Source read with {} page queries", extractor.queries());

    for table in report.tables() {
        tracing::info!(
            "Table '{}': {} rows read in {} pages, {} new rows in {} statements",
            table.table,
            table.rows_read,
            table.pages,
            table.rows_inserted,
            table.statements
        );
    }

    Ok(report)
}

/// Check that every destination table holds a row for each source key
///
/// Source rows sharing a conflict key land as a single destination row, so
/// each table is compared against its count of distinct conflict keys rather
/// than its raw row count.
///
/// # Arguments
///
/// * `source` - SQLite source connection the load read from
/// * `destination` - Destination the load wrote to
/// * `schema` - Destination schema holding the catalog tables
///
/// # Returns
///
/// `Ok(())` when no table is short; otherwise an error listing every short
/// table as `name (actual < expected)`.
pub async fn verify_row_counts<D: Destination>(
    source: &Connection,
    destination: &mut D,
    schema: &str,
) -> Result<()> {
    let mut short = Vec::new();

    for table in Table::ALL {
        let expected = reader::get_table_key_count(source, table)?;
        let actual = destination.count_rows(schema, table).await?;

        if actual < expected {
            tracing::warn!(
                "Table '{}.{}' has {} rows, source has {} distinct keys",
                schema,
                table,
                actual,
                expected
            );
            short.push(format!("{} ({} < {})", table, actual, expected));
        } else {
            tracing::info!(
                "Verified '{}.{}': {} rows (source {})",
                schema,
                table,
                actual,
                expected
            );
        }
    }

    if !short.is_empty() {
        bail!(
            "Destination is missing rows in: {}",
            short.join(", ")
        );
    }

    Ok(())
}

async fn load_and_verify<D: Destination>(
    source: &Connection,
    destination: &mut D,
    options: &LoadOptions,
    verify: bool,
) -> Result<LoadReport> {
    let report = load_from_sqlite(source, destination, options).await?;
    if verify {
        verify_row_counts(source, destination, &options.schema).await?;
    }
    Ok(report)
}

/// Run one complete load with the given settings
///
/// Opens the source read-only, connects to PostgreSQL, loads, and optionally
/// verifies. Both connections are closed whether the load succeeds or not.
/// A failed run can simply be started again; already committed chunks are
/// skipped by their conflict keys.
///
/// # Examples
///
/// ```no_run
/// # use sqlite_to_postgres::{config::Settings, pipeline};
/// # async fn example() -> anyhow::Result<()> {
/// let settings = Settings::load(None, |key| std::env::var(key).ok())?;
/// let report = pipeline::run(&settings).await?;
/// println!("{} new rows", report.total_inserted());
/// # Ok(())
/// # }
/// ```
pub async fn run(settings: &Settings) -> Result<LoadReport> {
    tracing::info!("Starting catalog load from '{}'", settings.sqlite_path);

    let source = sqlite::open_sqlite(&settings.sqlite_path)?;

    let mut destination =
        match postgres::connect_with_retry(&settings.postgres, settings.load.connect_retries)
            .await
        {
            Ok(destination) => destination,
            Err(e) => {
                sqlite::close_sqlite(source);
                tracing::error!("Catalog load failed: {:#}", e);
                return Err(e);
            }
        };

    let options = LoadOptions::from_settings(settings);
    let result = load_and_verify(&source, &mut destination, &options, settings.load.verify).await;

    destination.close().await;
    sqlite::close_sqlite(source);

    match &result {
        Ok(report) => tracing::info!(
            "Catalog load completed: {} rows read, {} new rows",
            report.total_read(),
            report.total_inserted()
        ),
        Err(e) => tracing::error!("Catalog load failed: {:#}", e),
    }

    result
}
