// ABOUTME: PostgreSQL destination for the catalog load
// ABOUTME: Exposes connection management and the chunked idempotent writer

pub mod connection;
pub mod writer;

pub use connection::{connect, connect_with_retry, PostgresDestination};
pub use writer::{
    build_insert_statement, BatchWriter, Destination, InsertStatement, LoadReport, TableReport,
};
