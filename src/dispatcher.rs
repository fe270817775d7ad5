//! Concurrent crawl loop.
//!
//! A fixed number of worker tasks share one backlog, one proxy pool and one
//! result aggregator. Pool exhaustion cancels the run cooperatively: workers
//! finish what they are doing, stop claiming URLs, and the partial results are
//! returned together with everything left unprocessed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::aggregator::{FailedUrl, FailureReason, ResultAggregator};
use crate::error::{ExtractError, FetchError};
use crate::fetch::PageFetcher;
use crate::headers::{HeaderProvider, HeaderSet};
use crate::html_extractor::ProductExtractor;
use crate::proxy::ProxyPool;
use crate::record::ProductRecord;

/// Pending URLs for one run. Claiming removes the URL in the same step.
#[derive(Debug)]
pub struct Backlog {
    urls: Mutex<VecDeque<String>>,
}

impl Backlog {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls: Mutex::new(urls.into()),
        }
    }

    /// Next URL, or `None` once the backlog is empty. Never waits for work.
    pub async fn claim(&self) -> Option<String> {
        self.urls.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.urls.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Removes and returns whatever is left.
    pub async fn drain(&self) -> Vec<String> {
        self.urls.lock().await.drain(..).collect()
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub workers: usize,
    pub max_attempts: u32,
    pub fetch_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

/// Outcome of one crawl run.
///
/// Every input URL ends up in exactly one of `records`, `failed` or
/// `unprocessed`.
#[derive(Debug)]
pub struct CrawlReport {
    pub records: Vec<ProductRecord>,
    pub failed: Vec<FailedUrl>,
    pub unprocessed: Vec<String>,
    pub terminated_early: bool,
    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn outcome_count(&self) -> usize {
        self.records.len() + self.failed.len() + self.unprocessed.len()
    }

    /// Response for server-triggered runs.
    pub fn status_response(&self) -> serde_json::Value {
        let (status_code, message) = if self.terminated_early {
            (503, "crawl terminated early: proxy pool exhausted")
        } else {
            (200, "crawl completed")
        };
        let body = json!({
            "message": message,
            "records": self.records.len(),
            "failed": self.failed,
            "unprocessed": self.unprocessed.len(),
            "elapsed_ms": self.elapsed.as_millis() as u64,
        });

        json!({
            "headers": { "Content-Type": "application/json" },
            "statusCode": status_code,
            "body": body.to_string(),
        })
    }
}

pub struct CrawlDispatcher {
    fetcher: Arc<dyn PageFetcher>,
    extractor: ProductExtractor,
    options: DispatchOptions,
}

impl CrawlDispatcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>, options: DispatchOptions) -> Self {
        Self {
            fetcher,
            extractor: ProductExtractor::new(),
            options,
        }
    }

    pub async fn run(
        &self,
        urls: Vec<String>,
        pool: Arc<ProxyPool>,
        header_provider: Arc<dyn HeaderProvider>,
    ) -> CrawlReport {
        let started = Instant::now();
        let total = urls.len();
        let workers = self.options.workers.max(1);

        let backlog = Arc::new(Backlog::new(urls));
        let aggregator = Arc::new(ResultAggregator::new());
        let abandoned = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        info!(urls = total, workers, "crawl started");

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let worker = Worker {
                    backlog: backlog.clone(),
                    pool: pool.clone(),
                    header_provider: header_provider.clone(),
                    fetcher: self.fetcher.clone(),
                    extractor: self.extractor,
                    aggregator: aggregator.clone(),
                    abandoned: abandoned.clone(),
                    cancel: cancel.clone(),
                    max_attempts: self.options.max_attempts.max(1),
                    fetch_timeout: self.options.fetch_timeout,
                };
                tokio::spawn(worker.run().instrument(info_span!("worker", worker = id)))
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "worker task failed");
            }
        }

        let (records, failed) = aggregator.drain().await;
        let mut unprocessed = std::mem::take(&mut *abandoned.lock().await);
        unprocessed.extend(backlog.drain().await);

        let report = CrawlReport {
            records,
            failed,
            unprocessed,
            terminated_early: cancel.is_cancelled(),
            elapsed: started.elapsed(),
        };

        if report.terminated_early {
            warn!(
                records = report.records.len(),
                failed = report.failed.len(),
                unprocessed = report.unprocessed.len(),
                "crawl terminated early"
            );
        } else {
            info!(
                records = report.records.len(),
                failed = report.failed.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "crawl finished"
            );
        }
        report
    }
}

enum Outcome {
    Record(Box<ProductRecord>),
    Failed(FailureReason),
    PoolExhausted,
}

struct Worker {
    backlog: Arc<Backlog>,
    pool: Arc<ProxyPool>,
    header_provider: Arc<dyn HeaderProvider>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: ProductExtractor,
    aggregator: Arc<ResultAggregator>,
    abandoned: Arc<Mutex<Vec<String>>>,
    cancel: CancellationToken,
    max_attempts: u32,
    fetch_timeout: Duration,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                debug!("cancellation observed, stopping");
                break;
            }
            let Some(url) = self.backlog.claim().await else {
                break;
            };

            let headers = self.header_provider.headers();
            match self.process(&url, &headers).await {
                Outcome::Record(record) => self.aggregator.add(*record).await,
                Outcome::Failed(reason) => {
                    self.aggregator.add_failure(FailedUrl { url, reason }).await
                }
                Outcome::PoolExhausted => {
                    warn!(url = %url, "proxy pool exhausted, cancelling crawl");
                    self.cancel.cancel();
                    self.abandoned.lock().await.push(url);
                    break;
                }
            }
        }
    }

    /// Fetches `url` through fresh proxies until one attempt succeeds or the
    /// attempts run out. Every failed attempt retires its proxy.
    async fn process(&self, url: &str, headers: &HeaderSet) -> Outcome {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            let Ok(proxy) = self.pool.acquire().await else {
                return Outcome::PoolExhausted;
            };

            let started = Instant::now();
            debug!(url, proxy = %proxy, attempt, "fetch started");
            let result = match timeout(self.fetch_timeout, self.fetcher.fetch(url, &proxy, headers)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout {
                    timeout_ms: self.fetch_timeout.as_millis(),
                }),
            };

            match result {
                Ok(html) => {
                    info!(
                        url,
                        proxy = %proxy,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "fetch succeeded"
                    );
                    return self.extract(url, &html);
                }
                Err(err) => {
                    warn!(url, proxy = %proxy, attempt, kind = err.kind(), error = %err, "fetch failed");
                    self.pool.retire(&proxy).await;
                    last_error = Some(err);
                }
            }
        }

        Outcome::Failed(FailureReason::Network {
            attempts: self.max_attempts,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    fn extract(&self, url: &str, html: &str) -> Outcome {
        debug!(url, bytes = html.len(), "extraction started");
        match self.extractor.extract(html, url) {
            Ok(record) => {
                info!(url, asin = ?record.asin, name = ?record.name, "product extracted");
                Outcome::Record(Box::new(record))
            }
            Err(ExtractError::MalformedDocument { reason, .. }) => {
                warn!(url, reason = %reason, "malformed document");
                Outcome::Failed(FailureReason::MalformedDocument { reason })
            }
        }
    }
}
