// src/session.rs
use crate::types::{Config, ReconMapError};
use governor::{Jitter, Quota};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Shared outbound HTTP client plus per-provider rate limiters.
///
/// Cloning is cheap: the client and the limiters are reference counted, so
/// every worker can hold its own copy.
#[derive(Clone)]
pub struct Session {
    pub client: Client,
    rate_limiters: Arc<HashMap<String, Arc<governor::DefaultDirectRateLimiter>>>,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self, ReconMapError> {
        Self::with_timeout(config, config.timeout)
    }

    pub fn with_timeout(config: &Config, timeout: Duration) -> Result<Self, ReconMapError> {
        let mut client_builder = Client::builder()
            .timeout(timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .deflate(true)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10);

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ReconMapError::ConfigError(format!("Invalid proxy URL: {}", e)))?;
            client_builder = client_builder.proxy(proxy);
        }

        let client = client_builder
            .build()
            .map_err(|e| ReconMapError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let mut rate_limiters = HashMap::new();
        for (provider, limit) in &config.rate_limits {
            if let Some(per_minute) = limit.and_then(NonZeroU32::new) {
                let quota = Quota::per_minute(per_minute).allow_burst(NonZeroU32::MIN);
                rate_limiters.insert(provider.clone(), Arc::new(governor::RateLimiter::direct(quota)));
            }
        }

        Ok(Session {
            client,
            rate_limiters: Arc::new(rate_limiters),
        })
    }

    /// Wait until the provider's limiter allows another request.
    pub async fn wait_for_rate_limit(&self, provider: &str) {
        if let Some(limiter) = self.rate_limiters.get(provider) {
            limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;
        }
    }

    pub fn has_rate_limit(&self, provider: &str) -> bool {
        self.rate_limiters.contains_key(provider)
    }

    /// GET `url` on behalf of `provider`, mapping status codes onto the
    /// transient/hard error split used by the retry policy.
    pub async fn get(&self, provider: &str, url: &str) -> Result<reqwest::Response, ReconMapError> {
        self.wait_for_rate_limit(provider).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(provider, e))?;

        check_status(provider, response.status())?;
        Ok(response)
    }

    pub async fn get_text(&self, provider: &str, url: &str) -> Result<String, ReconMapError> {
        self.get(provider, url)
            .await?
            .text()
            .await
            .map_err(|e| request_error(provider, e))
    }

    pub async fn post_json<T, R>(&self, provider: &str, url: &str, json: &T) -> Result<R, ReconMapError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .json(json)
            .send()
            .await
            .map_err(|e| request_error(provider, e))?;

        check_status(provider, response.status())?;

        response.json::<R>().await.map_err(|e| ReconMapError::SourceError {
            source_name: provider.to_string(),
            message: format!("Failed to parse response: {}", e),
        })
    }
}

fn request_error(provider: &str, error: reqwest::Error) -> ReconMapError {
    if error.is_timeout() {
        ReconMapError::TimeoutError(format!("{}: {}", provider, error))
    } else {
        ReconMapError::NetworkError(format!("{}: {}", provider, error))
    }
}

/// 5xx and 429 are worth retrying, any other non-success status is not.
pub fn check_status(provider: &str, status: StatusCode) -> Result<(), ReconMapError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(ReconMapError::SourceUnavailable {
            source_name: provider.to_string(),
            message: format!("HTTP {}", status),
        })
    } else {
        Err(ReconMapError::SourceError {
            source_name: provider.to_string(),
            message: format!("HTTP {}", status),
        })
    }
}
