//! Legacy platform source.
//!
//! The platform exposes one paginated endpoint per type name, addressed by
//! `cursor` and `limit` and answering with a page of records plus the
//! number of records remaining after that page.

pub mod fields;
mod http;
pub mod records;
mod snapshot;

pub use http::HttpSource;
pub use snapshot::StaticSource;

use crate::error::SourceError;
use crate::pipeline::RetryPolicy;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// One page of source records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub cursor: usize,
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub remaining: usize,
    #[serde(default)]
    pub count: usize,
}

/// Read-only paginated access to the source platform.
#[async_trait]
pub trait SourceApi: Send + Sync {
    async fn fetch_page(
        &self,
        type_name: &str,
        cursor: usize,
        limit: usize,
    ) -> Result<Page, SourceError>;
}

/// Fetch every record of `type_name`, following the cursor until the
/// platform reports nothing remaining. Transient page failures are retried
/// with `retry`; anything else is returned to the caller.
///
/// `max` stops pagination once that many records have been collected.
pub async fn fetch_all(
    api: &dyn SourceApi,
    type_name: &str,
    page_size: usize,
    max: Option<usize>,
    retry: &RetryPolicy,
) -> Result<Vec<Value>, SourceError> {
    let mut records = Vec::new();
    let mut cursor = 0;

    loop {
        let limit = match max {
            Some(max) => page_size.min(max.saturating_sub(records.len())),
            None => page_size,
        };
        if limit == 0 {
            break;
        }

        let page = fetch_page_with_retry(api, type_name, cursor, limit, retry).await?;
        let received = page.results.len();
        debug!(
            type_name,
            cursor,
            received,
            remaining = page.remaining,
            "Fetched source page"
        );
        records.extend(page.results);

        if received == 0 || page.remaining == 0 {
            break;
        }
        cursor += received;
    }

    if let Some(max) = max {
        records.truncate(max);
    }
    Ok(records)
}

async fn fetch_page_with_retry(
    api: &dyn SourceApi,
    type_name: &str,
    cursor: usize,
    limit: usize,
    retry: &RetryPolicy,
) -> Result<Page, SourceError> {
    let label = format!("{}@{}", type_name, cursor);
    retry
        .run(&label, || api.fetch_page(type_name, cursor, limit))
        .await
}
