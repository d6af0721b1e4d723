//! Shared HTTP plumbing for registry lookups: pacing, 429 retry and outcome mapping.

use crate::registry::sleeper::{Sleeper, TokioSleeper};
use crate::types::{HttpConfig, RegistryCheck, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Response, StatusCode};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Base URLs of the public registries.
#[derive(Debug, Clone)]
pub struct RegistryEndpoints {
    pub npm: String,
    pub pypi: String,
    pub packagist: String,
    pub maven: String,
    pub rubygems: String,
}

impl Default for RegistryEndpoints {
    fn default() -> Self {
        Self {
            npm: "https://registry.npmjs.org".to_string(),
            pypi: "https://pypi.org".to_string(),
            packagist: "https://packagist.org".to_string(),
            maven: "https://repo1.maven.org/maven2".to_string(),
            rubygems: "https://rubygems.org".to_string(),
        }
    }
}

impl RegistryEndpoints {
    /// Point every registry at one base URL.
    pub fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            npm: base.clone(),
            pypi: base.clone(),
            packagist: base.clone(),
            maven: base.clone(),
            rubygems: base,
        }
    }
}

/// Retry budget for throttled lookups. Only HTTP 429 is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Requests issued per lookup, first one included.
    pub max_attempts: u32,
    /// Fixed wait after every 429, the last one included.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(10),
        }
    }
}

/// Outcome of a single registry GET after retries.
pub enum Lookup {
    /// HTTP 200; body not yet consumed.
    Found(Response),
    /// Anything else, already mapped to a check result.
    Settled(RegistryCheck),
}

/// HTTP client shared by every resolver of one scan.
pub struct RegistryClient {
    client: Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    endpoints: RegistryEndpoints,
}

impl RegistryClient {
    /// Create a client against the public registries.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .http1_only()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        let per_second = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            rate_limiter,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            endpoints: RegistryEndpoints::default(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: RegistryEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = retry;
        self.sleeper = sleeper;
        self
    }

    pub fn endpoints(&self) -> &RegistryEndpoints {
        &self.endpoints
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// GET `url`, waiting out 429 responses up to the retry budget.
    ///
    /// Transport errors are not retried.
    pub async fn get(&self, identifier: &str, url: &str) -> Lookup {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.rate_limiter.until_ready().await;
            trace!("Checking {} (attempt {}): {}", identifier, attempt, url);

            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Error requesting {} for {}: {}", url, identifier, e);
                    return Lookup::Settled(RegistryCheck::NetworkError(e.to_string()));
                }
            };

            match response.status() {
                StatusCode::OK => return Lookup::Found(response),
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!(
                        "Registry responded 429 for {} (attempt {}/{}), waiting {}s",
                        identifier,
                        attempt,
                        max_attempts,
                        self.retry.backoff.as_secs()
                    );
                    self.sleeper.sleep(self.retry.backoff).await;
                    if attempt >= max_attempts {
                        warn!(
                            "Still rate limited after {} attempts, reporting {} as unavailable",
                            attempt, identifier
                        );
                        return Lookup::Settled(RegistryCheck::RateLimited);
                    }
                    attempt += 1;
                }
                status => {
                    debug!("{} answered {} for {}", url, status, identifier);
                    return Lookup::Settled(RegistryCheck::NotFound {
                        status: status.as_u16(),
                    });
                }
            }
        }
    }

    /// Plain existence check: 200 means available.
    pub async fn check(&self, identifier: &str, url: &str) -> RegistryCheck {
        match self.get(identifier, url).await {
            Lookup::Found(_) => RegistryCheck::Available,
            Lookup::Settled(check) => check,
        }
    }
}
