//! Run settings, merged from a URL file, a settings file and `CRAWLER__*`
//! environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::dispatcher::DispatchOptions;
use crate::error::CrawlError;

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Daily rolling log files are written here when set.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default = "default_client")]
    pub client: String,

    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(default)]
    pub proxy_file: Option<PathBuf>,

    #[serde(default)]
    pub user_agents: Vec<String>,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Upload to the object store instead of appending to a local CSV file.
    #[serde(default)]
    pub aws_env: bool,
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default)]
    pub object_store_endpoint: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub log: LogSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_client() -> String {
    "crawler".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_max_redirects() -> usize {
    3
}

fn default_accept_language() -> String {
    "de-DE,de;q=0.9,en;q=0.8".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Settings {
    pub fn load(url_file: &Path, settings_file: &Path) -> Result<Self, CrawlError> {
        let settings = Config::builder()
            .add_source(File::from(url_file))
            .add_source(File::from(settings_file))
            .add_source(Environment::with_prefix("CRAWLER").separator("__"))
            .build()?
            .try_deserialize::<Settings>()?;

        tracing::debug!(
            urls = settings.urls.len(),
            workers = settings.workers,
            client = %settings.client,
            "settings loaded"
        );
        Ok(settings)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            workers: self.workers,
            max_attempts: self.max_attempts,
            fetch_timeout: self.fetch_timeout(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
