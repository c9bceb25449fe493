//! Chunked, bounded-concurrency fetches with retry

use crate::error::{AuthzError, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Tuning for [`batch_get`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    /// Keys per fetch call
    pub chunk_size: usize,
    /// Fetch calls in flight at once
    pub concurrency: usize,
    /// Extra attempts for a chunk that failed with a retryable error
    pub retries: u32,
    /// Base backoff; attempt `n` waits `n * retry_delay_ms`
    pub retry_delay_ms: u64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            chunk_size: 100,
            concurrency: 3,
            retries: 2,
            retry_delay_ms: 50,
        }
    }
}

impl BatchOptions {
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Fetch records for `keys` through `fetch`, one call per chunk
///
/// Keys are de-duplicated first. A chunk that fails with
/// [`AuthzError::StoreUnavailable`] is retried up to `options.retries` times;
/// any other error, or the last retryable one, fails the whole batch.
/// Records come back in no particular order.
pub async fn batch_get<T, F, Fut>(keys: &[String], options: &BatchOptions, fetch: F) -> Result<Vec<T>>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut seen = HashSet::new();
    let unique: Vec<String> = keys
        .iter()
        .filter(|key| seen.insert(key.as_str()))
        .cloned()
        .collect();
    if unique.is_empty() {
        return Ok(Vec::new());
    }

    let chunks: Vec<Vec<String>> = unique
        .chunks(options.chunk_size.max(1))
        .map(<[String]>::to_vec)
        .collect();
    debug!(keys = unique.len(), chunks = chunks.len(), "Batch fetch");

    let fetch = &fetch;
    let mut results = stream::iter(chunks)
        .map(|chunk| fetch_with_retry(fetch, chunk, options))
        .buffer_unordered(options.concurrency.max(1));

    let mut records = Vec::new();
    while let Some(result) = results.next().await {
        records.extend(result?);
    }
    Ok(records)
}

async fn fetch_with_retry<T, F, Fut>(fetch: &F, chunk: Vec<String>, options: &BatchOptions) -> Result<Vec<T>>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut attempt = 0;
    loop {
        match fetch(chunk.clone()).await {
            Ok(records) => return Ok(records),
            Err(AuthzError::StoreUnavailable(reason)) if attempt < options.retries => {
                attempt += 1;
                warn!(attempt, keys = chunk.len(), %reason, "Store fetch failed, retrying");
                tokio::time::sleep(options.retry_delay(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
