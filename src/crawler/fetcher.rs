//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - One retained client per domain, rebuilt after a configured number of
//!   requests so long crawls do not pin a single connection pool
//! - Linear-backoff retries for transient failures
//! - Error classification

use crate::config::HttpConfig;
use crate::url::domain_of;
use reqwest::{Client, StatusCode};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors that can occur while fetching a page
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Cannot fetch '{0}': no domain")]
    InvalidUrl(String),
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The HTTP configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use statehouse::config::HttpConfig;
/// use statehouse::crawler::build_http_client;
///
/// let config = HttpConfig {
///     crawler_name: "statehouse".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.org/about".to_string(),
///     contact_email: "ops@example.org".to_string(),
///     max_attempts: 3,
///     backoff_ms: 1000,
///     recycle_after: 100,
///     timeout_secs: 30,
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent())
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

struct Session {
    client: Client,
    requests: u32,
}

/// Page fetcher with per-domain sessions
///
/// Owned by the fetch worker; not shared.
pub struct Fetcher {
    config: HttpConfig,
    sessions: HashMap<String, Session>,
}

impl Fetcher {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// Returns the client for a domain, rebuilding it when it is due for recycling
    fn session(&mut self, domain: &str) -> Result<Client, FetchError> {
        let session = match self.sessions.entry(domain.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Session {
                client: build_http_client(&self.config)?,
                requests: 0,
            }),
        };

        if session.requests >= self.config.recycle_after {
            debug!(domain, requests = session.requests, "Recycling HTTP session");
            session.client = build_http_client(&self.config)?;
            session.requests = 0;
        }

        session.requests += 1;
        Ok(session.client.clone())
    }

    /// Number of requests served by the current session of a domain
    pub fn session_requests(&self, domain: &str) -> u32 {
        self.sessions.get(domain).map_or(0, |s| s.requests)
    }

    /// Fetches a page body with retry logic
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return the body |
    /// | 4xx other than 429 | Fail immediately |
    /// | 429, 5xx, network error | Retry after `backoff * attempt` |
    /// | Attempts used up | `FetchError::Exhausted` |
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    ///
    /// # Returns
    ///
    /// The response body as text
    pub async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        let domain = domain_of(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let client = self.session(&domain)?;
            trace!(url, attempt, "GET");

            match client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(e) => last_error = e.to_string(),
                        }
                    } else if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    } else {
                        last_error = format!("HTTP {}", status.as_u16());
                    }
                }
                Err(e) => last_error = e.to_string(),
            }

            if attempt < attempts {
                let wait = self.config.backoff() * attempt;
                warn!(url, attempt, error = %last_error, ?wait, "Fetch failed, retrying");
                tokio::time::sleep(wait).await;
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }
}
