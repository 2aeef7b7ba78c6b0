// ABOUTME: Shared helpers for SQL identifiers and transient-failure retries
// ABOUTME: Identifiers from configuration are checked and quoted before reaching SQL text

use anyhow::{bail, Result};
use std::future::Future;
use std::time::Duration;

/// Longest identifier PostgreSQL keeps without truncation (NAMEDATALEN - 1)
const MAX_IDENTIFIER_LEN: usize = 63;

/// Run `operation` until it succeeds, at most `max_retries + 1` times
///
/// The pause before the first retry is `initial_delay` and doubles after each
/// further failure. Every failure but the last is logged as a warning; the
/// last one is returned to the caller unchanged.
///
/// ```no_run
/// # use anyhow::Result;
/// # use std::time::Duration;
/// # use sqlite_to_postgres::utils::retry_with_backoff;
/// # async fn example() -> Result<()> {
/// let version = retry_with_backoff(|| async { Ok("16.2") }, 3, Duration::from_secs(1)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut pause = initial_delay;
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt > max_retries {
            return Err(err);
        }

        tracing::warn!(
            "Attempt {} of {} failed: {}. Next attempt in {:?}",
            attempt,
            max_retries + 1,
            err,
            pause
        );
        tokio::time::sleep(pause).await;
        pause *= 2;
        attempt += 1;
    }
}

/// Check that a schema or table name is a plain PostgreSQL identifier
///
/// Accepts 1 to 63 ASCII letters, digits and underscores, not starting with
/// a digit. Surrounding whitespace is rejected rather than trimmed.
///
/// ```
/// # use sqlite_to_postgres::utils::validate_postgres_identifier;
/// assert!(validate_postgres_identifier("content").is_ok());
/// assert!(validate_postgres_identifier("_staging").is_ok());
/// assert!(validate_postgres_identifier("1content").is_err());
/// assert!(validate_postgres_identifier("content\"; DROP TABLE genre; --").is_err());
/// ```
pub fn validate_postgres_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        bail!("Identifier cannot be empty or whitespace-only");
    }

    let shown = sanitize_identifier(identifier);

    if identifier.len() > MAX_IDENTIFIER_LEN {
        bail!(
            "Identifier '{}' is {} bytes long, PostgreSQL allows at most {}",
            shown,
            identifier.len(),
            MAX_IDENTIFIER_LEN
        );
    }

    for (position, c) in identifier.chars().enumerate() {
        let allowed = c == '_' || c.is_ascii_alphabetic() || (position > 0 && c.is_ascii_digit());
        if !allowed {
            let printable = if c.is_control() {
                format!("\\x{:02x}", c as u32)
            } else {
                c.to_string()
            };
            bail!(
                "Identifier '{}' has unsupported character '{}' at position {} \
                 (use letters, digits and underscores, starting with a letter or underscore)",
                shown,
                printable,
                position
            );
        }
    }

    Ok(())
}

/// Make an identifier safe to print: control characters dropped, 100 chars max
///
/// ```
/// # use sqlite_to_postgres::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("film\nwork"), "filmwork");
/// assert_eq!(sanitize_identifier(&"a".repeat(200)).len(), 100);
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Double-quote an identifier for PostgreSQL, escaping embedded quotes
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// `"schema"."table"` with both parts quoted
pub fn qualified_table_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_validate_postgres_identifier() {
        assert!(validate_postgres_identifier("content").is_ok());
        assert!(validate_postgres_identifier("Content_2024").is_ok());
        assert!(validate_postgres_identifier("").is_err());
        assert!(validate_postgres_identifier("   ").is_err());
        assert!(validate_postgres_identifier(" content").is_err());
        assert!(validate_postgres_identifier("my-schema").is_err());
        assert!(validate_postgres_identifier("schema.table").is_err());
        assert!(validate_postgres_identifier("2schema").is_err());
        assert!(validate_postgres_identifier(&"a".repeat(64)).is_err());
        assert!(validate_postgres_identifier(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_invalid_identifier_reports_control_chars() {
        let err = validate_postgres_identifier("bad\x00name").unwrap_err();
        assert!(err.to_string().contains("\\x00"));
        assert!(err.to_string().contains("position 3"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("type"), "\"type\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(
            qualified_table_name("content", "film_work"),
            "\"content\".\"film_work\""
        );
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result = retry_with_backoff(
            move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("transient failure")
                }
                Ok(42)
            },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<()> = retry_with_backoff(
            move || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("failure {}", n)
            },
            2,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result.unwrap_err().to_string(), "failure 2");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retries_means_single_attempt() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<()> = retry_with_backoff(
            move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("refused")
            },
            0,
            Duration::from_millis(1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
