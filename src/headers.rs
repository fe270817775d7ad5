use std::collections::BTreeMap;

use rand::seq::SliceRandom;

use crate::settings::Settings;

/// Request headers, name to value.
pub type HeaderSet = BTreeMap<String, String>;

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Produces the headers for one request.
pub trait HeaderProvider: Send + Sync {
    fn headers(&self) -> HeaderSet;
}

/// Rotates through the configured user agents.
#[derive(Debug, Clone)]
pub struct SettingsHeaderProvider {
    user_agents: Vec<String>,
    accept_language: String,
}

impl SettingsHeaderProvider {
    pub fn new(user_agents: Vec<String>, accept_language: impl Into<String>) -> Self {
        Self {
            user_agents,
            accept_language: accept_language.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.user_agents.clone(), settings.accept_language.clone())
    }
}

impl HeaderProvider for SettingsHeaderProvider {
    fn headers(&self) -> HeaderSet {
        let user_agent = self
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DESKTOP_UA);

        let mut headers = HeaderSet::new();
        headers.insert("User-Agent".to_string(), user_agent.to_string());
        headers.insert("Accept".to_string(), ACCEPT.to_string());
        headers.insert("Accept-Language".to_string(), self.accept_language.clone());
        headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());
        headers
    }
}
