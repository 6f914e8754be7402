//! City feed retrieval with bounded retry.
//!
//! [`Fetcher`] GETs a city's public occupancy endpoint and decodes the JSON
//! body. Transient failures (timeouts, connection errors, 429 and 5xx) are
//! retried with exponential backoff; anything else fails immediately.

use std::collections::HashMap;
use std::time::Duration;

use parkcast_core::city::City;
use parkcast_core::retry::{retry, RetryPolicy};
use serde_json::Value;

use crate::error::FetchError;

/// Default HTTP timeout for one fetch attempt.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
    /// Per-city endpoint overrides; other cities use their public URL.
    urls: HashMap<City, String>,
}

impl Fetcher {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("parkcast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            policy,
            urls: HashMap::new(),
        })
    }

    /// Fetch `city` from `url` instead of its public endpoint.
    pub fn with_url(mut self, city: City, url: impl Into<String>) -> Self {
        self.urls.insert(city, url.into());
        self
    }

    pub fn url_for(&self, city: City) -> &str {
        self.urls
            .get(&city)
            .map(String::as_str)
            .unwrap_or_else(|| city.default_source_url())
    }

    /// Fetch and decode the current feed of `city`.
    pub async fn fetch(&self, city: City) -> Result<Value, FetchError> {
        let url = self.url_for(city);
        let op = format!("fetch {city}");
        retry(self.policy, &op, FetchError::is_transient, || self.get_json(url)).await
    }

    /// Execute a single GET and check the response status.
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}
