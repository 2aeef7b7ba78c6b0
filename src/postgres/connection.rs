// ABOUTME: PostgreSQL destination connection setup and teardown
// ABOUTME: Builds the client config from settings, connects over TLS, and owns the connection task

use crate::config::PostgresSettings;
use crate::utils;
use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config};

const APPLICATION_NAME: &str = "sqlite-to-postgres";

/// Build a `tokio_postgres::Config` from destination settings
///
/// TCP keepalives are always enabled so that a long load through a load
/// balancer does not get its idle connection dropped between chunks:
/// first probe after 60s idle, then every 10s.
pub fn build_config(settings: &PostgresSettings) -> Config {
    let mut config = Config::new();
    config
        .host(&settings.host)
        .port(settings.port)
        .dbname(&settings.dbname)
        .user(&settings.user)
        .ssl_mode(settings.sslmode)
        .application_name(APPLICATION_NAME)
        .connect_timeout(Duration::from_secs(10))
        .keepalives(true)
        .keepalives_idle(Duration::from_secs(60))
        .keepalives_interval(Duration::from_secs(10));

    if !settings.password.is_empty() {
        config.password(&settings.password);
    }

    config
}

/// An open destination connection
///
/// The background connection task is owned here so that `close` can wait
/// for the socket to shut down instead of leaving it to the runtime.
pub struct PostgresDestination {
    client: Client,
    connection: JoinHandle<()>,
}

impl PostgresDestination {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Drop the client and wait for the connection task to finish
    pub async fn close(self) {
        tracing::info!("Closing connection to PostgreSQL");
        drop(self.client);
        if let Err(e) = self.connection.await {
            tracing::warn!("PostgreSQL connection task ended abnormally: {}", e);
        }
    }
}

/// Known connection failures and the settings worth checking for each
const CONNECT_HINTS: &[(&[&str], &str)] = &[
    (
        &["password authentication failed"],
        "authentication failed, check POSTGRES_DB_USER and POSTGRES_DB_PASSWORD",
    ),
    (
        &["does not exist"],
        "database or role does not exist, check POSTGRES_DB_NAME and POSTGRES_DB_USER",
    ),
    (
        &["Connection refused", "could not connect"],
        "server unreachable, check POSTGRES_HOST and POSTGRES_PORT and that PostgreSQL is running",
    ),
    (
        &["timeout", "timed out"],
        "server did not answer within the connect timeout",
    ),
    (
        &["SSL", "TLS"],
        "TLS handshake failed, try POSTGRES_SSLMODE=disable for a local server",
    ),
    (
        &["no pg_hba.conf entry"],
        "server rejected this host in pg_hba.conf",
    ),
];

/// Prefix a raw connection error with a hint about which setting to check
fn describe_connect_error(error_msg: &str) -> anyhow::Error {
    let hint = CONNECT_HINTS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| error_msg.contains(n)))
        .map(|(_, hint)| *hint);

    match hint {
        Some(hint) => anyhow::anyhow!("Failed to connect to PostgreSQL ({}): {}", hint, error_msg),
        None => anyhow::anyhow!("Failed to connect to PostgreSQL: {}", error_msg),
    }
}

/// Connect to the destination database
///
/// TLS is negotiated according to `settings.sslmode`. Well-known failures
/// (bad password, unknown database, refused connection) get a hint naming
/// the setting to check.
///
/// # Examples
///
/// ```no_run
/// # use sqlite_to_postgres::config::Settings;
/// # use sqlite_to_postgres::postgres::connect;
/// # async fn example(settings: Settings) -> anyhow::Result<()> {
/// let destination = connect(&settings.postgres).await?;
/// destination.client().query_one("SELECT 1", &[]).await?;
/// destination.close().await;
/// # Ok(())
/// # }
/// ```
pub async fn connect(settings: &PostgresSettings) -> Result<PostgresDestination> {
    let config = build_config(settings);

    tracing::info!(
        "Connecting to PostgreSQL at {}:{}/{} as '{}'",
        settings.host,
        settings.port,
        settings.dbname,
        settings.user
    );

    let tls_connector = TlsConnector::builder()
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(tls_connector);

    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| describe_connect_error(&e.to_string()))?;

    let connection = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(PostgresDestination { client, connection })
}

/// Connect with retries on failure, backing off 1s, 2s, 4s, ...
pub async fn connect_with_retry(
    settings: &PostgresSettings,
    max_retries: u32,
) -> Result<PostgresDestination> {
    utils::retry_with_backoff(|| connect(settings), max_retries, Duration::from_secs(1))
        .await
        .context("Failed to connect to PostgreSQL after retries")
}
