//! Batch import pipeline.
//!
//! Records of one stage are processed in fixed-size chunks. Each chunk is
//! resolved, built and inserted as a unit; transient failures retry the
//! whole chunk, anything else fails the chunk and the stage moves on.

mod importer;
mod progress;

pub use importer::BatchImporter;
pub use progress::ProgressTracker;

use crate::config::ImportConfig;
use crate::error::{MigrationError, SourceError, StoreError};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that may succeed when the same operation is repeated.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        SourceError::is_transient(self)
    }
}

impl Transient for MigrationError {
    fn is_transient(&self) -> bool {
        match self {
            MigrationError::Store(e) => e.is_transient(),
            MigrationError::Source { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Fixed-delay retry for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Fail on the first error.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        label,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Transient failure; retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for RetryPolicy {
    fn from(config: &ImportConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }
}

/// Per-stage import settings.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub batch_size: usize,
    pub dry_run: bool,
    /// Cap on records processed per stage.
    pub limit: Option<usize>,
    /// Only process records owned by this source id.
    pub parent: Option<String>,
    pub progress_interval: usize,
    pub retry: RetryPolicy,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for ImportOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            dry_run: config.dry_run,
            limit: config.limit,
            parent: None,
            progress_interval: config.progress_interval,
            retry: RetryPolicy::from(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result: Result<u32, StoreError> = policy
            .run("test", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(StoreError::Transient("busy".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result: Result<(), StoreError> = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Constraint("NOT NULL".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let result: Result<(), StoreError> = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Transient("locked".into()))
            })
            .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn options_follow_import_config() {
        let config = ImportConfig {
            batch_size: 0,
            max_retries: 5,
            retry_delay_ms: 10,
            ..ImportConfig::default()
        };
        let options = ImportOptions::from(&config);
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.retry, RetryPolicy::new(5, Duration::from_millis(10)));
    }
}
