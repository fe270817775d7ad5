use serde::Serialize;
use tokio::sync::Mutex;

use crate::record::ProductRecord;

/// Why a URL produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Network { attempts: u32, last_error: String },
    MalformedDocument { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUrl {
    pub url: String,
    pub reason: FailureReason,
}

#[derive(Debug, Default)]
struct Collected {
    records: Vec<ProductRecord>,
    failed: Vec<FailedUrl>,
}

/// Shared sink that workers push finished outcomes into.
///
/// Order reflects completion, not submission.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    inner: Mutex<Collected>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, record: ProductRecord) {
        self.inner.lock().await.records.push(record);
    }

    pub async fn add_failure(&self, failure: FailedUrl) {
        self.inner.lock().await.failed.push(failure);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Takes everything collected so far. Call after all workers have joined.
    pub async fn drain(&self) -> (Vec<ProductRecord>, Vec<FailedUrl>) {
        let mut inner = self.inner.lock().await;
        let collected = std::mem::take(&mut *inner);
        (collected.records, collected.failed)
    }
}
