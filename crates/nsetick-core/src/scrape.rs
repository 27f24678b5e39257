use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::NseError;
use crate::http_client::{HttpClient, HttpRequest};

/// Scrape boundary: applies the fixed header set and timeout to every
/// request and turns non-2xx statuses into transport errors.
#[derive(Clone)]
pub struct Scraper {
    http_client: Arc<dyn HttpClient>,
    headers: Arc<BTreeMap<String, String>>,
    timeout_ms: u64,
}

impl Scraper {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        headers: BTreeMap<String, String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            http_client,
            headers: Arc::new(headers),
            timeout_ms,
        }
    }

    /// Fetches `url` and returns the decoded body.
    pub async fn fetch(&self, url: &str) -> Result<String, NseError> {
        let request = HttpRequest::get(url)
            .with_headers(self.headers.iter())
            .with_timeout_ms(self.timeout_ms);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| NseError::transport(format!("{url}: {}", error.message())))?;

        if !response.is_success() {
            return Err(NseError::transport(format!(
                "{url}: upstream returned status {}",
                response.status
            )));
        }

        Ok(response.body)
    }

    /// Fetches `url` and parses the body as JSON.
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, NseError> {
        let body = self.fetch(url).await?;
        serde_json::from_str(&body)
            .map_err(|error| NseError::malformed(format!("{url}: invalid JSON document: {error}")))
    }
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("headers", &self.headers)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}
