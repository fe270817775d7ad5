pub mod aggregator;
pub mod dispatcher;
pub mod error;
pub mod fetch;
pub mod headers;
pub mod html_extractor;
pub mod logging;
pub mod price;
pub mod proxy;
pub mod record;
pub mod settings;
pub mod store;

use std::sync::Arc;

pub use crate::aggregator::{FailedUrl, FailureReason, ResultAggregator};
pub use crate::dispatcher::{CrawlDispatcher, CrawlReport, DispatchOptions};
pub use crate::error::{CrawlError, ExtractError, FetchError, PersistenceError, ProxyError};
pub use crate::fetch::{PageFetcher, WreqFetcher};
pub use crate::headers::{HeaderProvider, HeaderSet, SettingsHeaderProvider};
pub use crate::html_extractor::ProductExtractor;
pub use crate::proxy::{ProxyEntry, ProxyPool};
pub use crate::record::{ProductRecord, CSV_COLUMNS};
pub use crate::settings::Settings;

/// Crawls `urls` with the proxies, headers and limits from `settings`.
///
/// Fails only when the proxy list cannot be read. Per-URL problems and pool
/// exhaustion are reported inside the returned [`CrawlReport`].
pub async fn crawl_async(urls: Vec<String>, settings: &Settings) -> Result<CrawlReport, CrawlError> {
    let pool = Arc::new(ProxyPool::load(&settings.proxies, settings.proxy_file.as_deref())?);
    let header_provider: Arc<dyn HeaderProvider> = Arc::new(SettingsHeaderProvider::from_settings(settings));
    let fetcher: Arc<dyn PageFetcher> = Arc::new(WreqFetcher::new(settings.fetch_timeout(), settings.max_redirects));

    let dispatcher = CrawlDispatcher::new(fetcher, settings.dispatch_options());
    Ok(dispatcher.run(urls, pool, header_provider).await)
}

/// Blocking wrapper around [`crawl_async`] for callers without a runtime.
pub fn crawl(urls: Vec<String>, settings: &Settings) -> Result<CrawlReport, CrawlError> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| CrawlError::Runtime(e.to_string()))?;
    runtime.block_on(crawl_async(urls, settings))
}

#[cfg(feature = "python")]
mod python {
    use std::path::PathBuf;

    use pyo3::exceptions::PyRuntimeError;
    use pyo3::prelude::*;
    use pyo3::types::PyDict;

    use crate::error::CrawlError;
    use crate::settings::Settings;

    async fn crawl_and_store(settings: Settings) -> Result<serde_json::Value, CrawlError> {
        let report = crate::crawl_async(settings.urls.clone(), &settings).await?;
        crate::store::store_records(&report.records, &settings).await?;
        Ok(report.status_response())
    }

    fn run(url_file: PathBuf, settings_file: PathBuf) -> Result<serde_json::Value, CrawlError> {
        let settings = Settings::load(&url_file, &settings_file)?;
        // A host process may already own the global subscriber.
        let _guard = crate::logging::init(&settings.log).ok();

        let runtime = tokio::runtime::Runtime::new().map_err(|e| CrawlError::Runtime(e.to_string()))?;
        runtime.block_on(crawl_and_store(settings))
    }

    /// Runs one crawl from a URL file and a settings file, stores the
    /// records and returns the status response as a dict.
    #[pyfunction]
    fn crawl_files(py: Python, url_file: PathBuf, settings_file: PathBuf) -> PyResult<PyObject> {
        let response = py
            .allow_threads(|| run(url_file, settings_file))
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;

        let dict = PyDict::new_bound(py);
        dict.set_item("statusCode", response["statusCode"].as_u64())?;

        let headers = PyDict::new_bound(py);
        headers.set_item("Content-Type", "application/json")?;
        dict.set_item("headers", headers)?;

        dict.set_item("body", response["body"].as_str().unwrap_or_default())?;
        Ok(dict.into())
    }

    #[pymodule]
    fn price_crawler(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(crawl_files, m)?)?;
        Ok(())
    }
}
