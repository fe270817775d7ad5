use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use price_crawler::{
    CrawlDispatcher, CrawlReport, DispatchOptions, FailureReason, FetchError, HeaderProvider,
    HeaderSet, PageFetcher, ProxyEntry, ProxyPool, SettingsHeaderProvider,
};

/// Serves canned pages and records how often each URL was requested.
#[derive(Default)]
struct ScriptedFetcher {
    calls: Mutex<HashMap<String, usize>>,
    failing: HashSet<String>,
    malformed: HashSet<String>,
    slow: HashSet<String>,
    fail_once: HashSet<String>,
}

impl ScriptedFetcher {
    fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        _proxy: &ProxyEntry,
        _headers: &HeaderSet,
    ) -> Result<String, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if self.slow.contains(url) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.failing.contains(url) || (self.fail_once.contains(url) && call == 1) {
            return Err(FetchError::Status {
                status: 503,
                url: url.to_string(),
            });
        }
        if self.malformed.contains(url) {
            return Ok(String::new());
        }
        Ok(format!(
            "<html><body><span id='productTitle'>Product at {url}</span>\
             <div id='corePriceDisplay_desktop_feature_div'>\
             <span class='priceToPay'><span class='a-offscreen'>19,99 €</span></span></div>\
             </body></html>"
        ))
    }
}

fn product_url(i: usize) -> String {
    format!("https://www.amazon.de/dp/B{i:09}")
}

fn pool(size: usize) -> Arc<ProxyPool> {
    let lines: Vec<String> = (0..size).map(|i| format!("10.0.0.{}:8080", i + 1)).collect();
    Arc::new(ProxyPool::from_lines(lines.iter().map(String::as_str)).unwrap())
}

fn headers() -> Arc<dyn HeaderProvider> {
    Arc::new(SettingsHeaderProvider::new(Vec::new(), "de-DE"))
}

fn options(workers: usize) -> DispatchOptions {
    DispatchOptions {
        workers,
        max_attempts: 3,
        fetch_timeout: Duration::from_secs(2),
    }
}

async fn run(
    fetcher: &Arc<ScriptedFetcher>,
    options: DispatchOptions,
    urls: Vec<String>,
    pool: Arc<ProxyPool>,
) -> CrawlReport {
    let dispatcher = CrawlDispatcher::new(fetcher.clone(), options);
    dispatcher.run(urls, pool, headers()).await
}

#[tokio::test]
async fn every_url_produces_exactly_one_record() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let urls: Vec<String> = (0..40).map(product_url).collect();

    let report = run(&fetcher, options(4), urls.clone(), pool(3)).await;

    assert!(!report.terminated_early);
    assert_eq!(report.records.len(), 40);
    assert!(report.failed.is_empty());
    assert!(report.unprocessed.is_empty());

    let seen: HashSet<&str> = report.records.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(seen.len(), 40);
    for url in &urls {
        assert_eq!(fetcher.calls(url), 1, "{url}");
    }
    assert!(report.records.iter().all(|r| r.current_price == Some(19.99)));
}

#[tokio::test]
async fn empty_pool_leaves_everything_unprocessed() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let urls: Vec<String> = (0..5).map(product_url).collect();

    let report = run(&fetcher, options(2), urls.clone(), pool(0)).await;

    assert!(report.terminated_early);
    assert!(report.records.is_empty());
    assert!(report.failed.is_empty());
    let mut unprocessed = report.unprocessed.clone();
    unprocessed.sort();
    assert_eq!(unprocessed, urls);
    assert_eq!(fetcher.total_calls(), 0);
    assert_eq!(report.status_response()["statusCode"], 503);
}

#[tokio::test]
async fn exhaustion_mid_run_keeps_partial_results() {
    let bad = product_url(3);
    let fetcher = Arc::new(ScriptedFetcher {
        failing: HashSet::from([bad.clone()]),
        ..Default::default()
    });
    let urls = vec![product_url(1), product_url(2), bad.clone(), product_url(4)];
    let pool = pool(2);

    let report = run(&fetcher, options(1), urls, pool.clone()).await;

    assert!(report.terminated_early);
    assert_eq!(report.records.len(), 2);
    assert!(report.failed.is_empty());
    assert_eq!(report.unprocessed, vec![bad.clone(), product_url(4)]);
    assert_eq!(report.outcome_count(), 4);
    assert_eq!(fetcher.calls(&bad), 2);
    assert_eq!(fetcher.calls(&product_url(4)), 0);
    assert!(pool.is_exhausted().await);
}

#[tokio::test]
async fn malformed_page_is_reported_without_retiring_the_proxy() {
    let broken = product_url(7);
    let fetcher = Arc::new(ScriptedFetcher {
        malformed: HashSet::from([broken.clone()]),
        ..Default::default()
    });
    let pool = pool(2);

    let report = run(&fetcher, options(2), vec![product_url(1), broken.clone()], pool.clone()).await;

    assert!(!report.terminated_early);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].url, broken);
    assert!(matches!(
        report.failed[0].reason,
        FailureReason::MalformedDocument { .. }
    ));
    assert_eq!(fetcher.calls(&broken), 1);
    assert_eq!(pool.alive_count().await, 2);
}

#[tokio::test]
async fn timed_out_fetch_becomes_network_failure() {
    let slow = product_url(9);
    let fetcher = Arc::new(ScriptedFetcher {
        slow: HashSet::from([slow.clone()]),
        ..Default::default()
    });
    let pool = pool(3);
    let options = DispatchOptions {
        workers: 1,
        max_attempts: 1,
        fetch_timeout: Duration::from_millis(50),
    };

    let report = run(&fetcher, options, vec![slow.clone()], pool.clone()).await;

    assert!(!report.terminated_early);
    assert!(report.records.is_empty());
    assert_eq!(report.failed.len(), 1);
    match &report.failed[0].reason {
        FailureReason::Network { attempts, last_error } => {
            assert_eq!(*attempts, 1);
            assert!(last_error.contains("timed out"), "{last_error}");
        }
        other => panic!("expected network failure, got {other:?}"),
    }
    assert_eq!(pool.alive_count().await, 2);
}

#[tokio::test]
async fn failed_attempt_is_retried_on_another_proxy() {
    let flaky = product_url(5);
    let fetcher = Arc::new(ScriptedFetcher {
        fail_once: HashSet::from([flaky.clone()]),
        ..Default::default()
    });
    let pool = pool(3);

    let report = run(&fetcher, options(1), vec![flaky.clone()], pool.clone()).await;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].url, flaky);
    assert_eq!(fetcher.calls(&flaky), 2);
    assert_eq!(pool.alive_count().await, 2);
}

#[tokio::test]
async fn exhausted_attempts_report_network_failure() {
    let bad = product_url(6);
    let fetcher = Arc::new(ScriptedFetcher {
        failing: HashSet::from([bad.clone()]),
        ..Default::default()
    });

    let report = run(&fetcher, options(1), vec![bad.clone(), product_url(1)], pool(5)).await;

    assert!(!report.terminated_early);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        &report.failed[0].reason,
        FailureReason::Network { attempts: 3, .. }
    ));
    assert_eq!(fetcher.calls(&bad), 3);
}

#[tokio::test]
async fn duplicate_urls_are_processed_independently() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let url = product_url(1);

    let report = run(&fetcher, options(2), vec![url.clone(), url.clone()], pool(2)).await;

    assert_eq!(report.records.len(), 2);
    assert_eq!(fetcher.calls(&url), 2);
    assert!(report.records[0].same_content(&report.records[1]));
}

#[tokio::test]
async fn empty_input_finishes_immediately() {
    let fetcher = Arc::new(ScriptedFetcher::default());

    let report = run(&fetcher, options(4), Vec::new(), pool(1)).await;

    assert_eq!(report.outcome_count(), 0);
    assert!(!report.terminated_early);
    assert_eq!(report.status_response()["statusCode"], 200);
}
