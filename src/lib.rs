// ABOUTME: Library module for sqlite-to-postgres
// ABOUTME: Exports the record schemas, SQLite reader, PostgreSQL writer, and pipeline driver

pub mod config;
pub mod pipeline;
pub mod postgres;
pub mod records;
pub mod sqlite;
pub mod utils;
