// ABOUTME: CLI entry point for sqlite-to-postgres
// ABOUTME: Builds settings once from file, environment, and flags, then runs the load

use anyhow::Context;
use clap::Parser;
use sqlite_to_postgres::{config::Settings, pipeline};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sqlite-to-postgres")]
#[command(
    about = "Copy the movie catalog from SQLite into PostgreSQL",
    long_about = "Copies genres, persons, film works and their links from a SQLite file into \
                  PostgreSQL. Rows that already exist are skipped, so the load can be re-run \
                  safely. Connection settings come from the environment (a .env file is read \
                  if present)."
)]
struct Cli {
    /// TOML settings file; environment variables override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Rows fetched from SQLite per page (overrides ETL_PAGE_SIZE)
    #[arg(long)]
    page_size: Option<usize>,
    /// Rows per INSERT statement (overrides ETL_CHUNK_SIZE)
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Compare source and destination row counts after loading
    #[arg(long)]
    verify: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let mut settings = Settings::load(cli.config.as_deref(), |key| std::env::var(key).ok())?;
    if let Some(page_size) = cli.page_size {
        settings.load.page_size = page_size;
    }
    if let Some(chunk_size) = cli.chunk_size {
        settings.load.chunk_size = chunk_size;
    }
    if cli.verify {
        settings.load.verify = true;
    }
    settings.validate()?;

    tracing::debug!("Settings: {:?}", settings);

    pipeline::run(&settings).await?;

    Ok(())
}
