use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::FetchError;
use crate::headers::HeaderSet;
use crate::proxy::ProxyEntry;

const CAPTCHA_MARKERS: [&str; 3] = [
    "/errors/validateCaptcha",
    "captchacharacters",
    "api-services-support@amazon.com",
];

/// Downloads one page through one proxy.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        proxy: &ProxyEntry,
        headers: &HeaderSet,
    ) -> Result<String, FetchError>;
}

/// Browser-emulating `wreq` client routed through the given proxy.
#[derive(Debug, Clone)]
pub struct WreqFetcher {
    timeout: Duration,
    max_redirects: usize,
}

impl WreqFetcher {
    pub fn new(timeout: Duration, max_redirects: usize) -> Self {
        Self {
            timeout,
            max_redirects,
        }
    }
}

#[async_trait]
impl PageFetcher for WreqFetcher {
    async fn fetch(
        &self,
        url: &str,
        proxy: &ProxyEntry,
        headers: &HeaderSet,
    ) -> Result<String, FetchError> {
        let proxy_url = proxy.proxy_url();
        let wreq_proxy =
            wreq::Proxy::all(&proxy_url).map_err(|e| FetchError::Proxy(e.to_string()))?;
        let client = wreq::Client::builder()
            .emulation(wreq_util::Emulation::Chrome131)
            .proxy(wreq_proxy)
            .timeout(self.timeout)
            .build()
            .map_err(|e| FetchError::Proxy(e.to_string()))?;

        let mut current_url = url.to_string();

        for _ in 0..=self.max_redirects {
            let mut request = client.get(&current_url);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let resp = request
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            let status = resp.status();
            let code = status.as_u16();

            if status.is_success() {
                let text = resp
                    .text()
                    .await
                    .map_err(|e| FetchError::Transport(e.to_string()))?;
                if is_bot_check(&text) {
                    return Err(FetchError::Blocked { url: current_url });
                }
                tracing::debug!(bytes = text.len(), status = code, url = %current_url, "page fetched");
                return Ok(text);
            }

            if (300..400).contains(&code) {
                let location = resp
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(location) = location {
                    let next_url = resolve_redirect(&current_url, &location);
                    tracing::debug!(from = %current_url, to = %next_url, "following redirect");
                    current_url = next_url;
                    continue;
                }
            }

            return Err(FetchError::Status {
                status: code,
                url: current_url,
            });
        }

        Err(FetchError::TooManyRedirects {
            url: url.to_string(),
            max_redirects: self.max_redirects,
        })
    }
}

/// Resolves a possibly relative `Location` header against the current URL.
fn resolve_redirect(current: &str, location: &str) -> String {
    match Url::parse(current).and_then(|base| base.join(location)) {
        Ok(next) => next.to_string(),
        Err(_) => location.to_string(),
    }
}

/// Marketplace bot checks come back as 200 with a captcha form.
pub fn is_bot_check(body: &str) -> bool {
    CAPTCHA_MARKERS.iter().any(|m| body.contains(m))
}
