//! Backend liveness probe.

use std::time::Duration;

use agrodash_core::{BackendConfig, ConfigError, FailureDescriptor};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// One reachability check against the backend.
///
/// `Ok` carries the HTTP status of whatever answered; the body is ignored.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> Result<u16, FailureDescriptor>;
}

/// `GET {base_url}{health_path}` with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(base_url: &str, health_path: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            health_path.trim_start_matches('/')
        );
        let url = Url::parse(&url)
            .map_err(|e| ConfigError::Invalid(format!("backend URL {url}: {e}")))?;

        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        Self::new(&config.base_url, &config.health_path, config.probe_timeout())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> Result<u16, FailureDescriptor> {
        tracing::debug!("Probing {}", self.url);
        // The timeout aborts the in-flight request rather than racing it
        self.client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map(|response| response.status().as_u16())
            .map_err(|e| FailureDescriptor::from_reqwest(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let probe =
            HttpHealthProbe::new("http://localhost:5000/api/", "/Farm/All", Duration::from_secs(5))
                .unwrap();
        assert_eq!(probe.url().as_str(), "http://localhost:5000/api/Farm/All");
    }

    #[test]
    fn test_from_default_config() {
        let probe = HttpHealthProbe::from_config(&BackendConfig::default()).unwrap();
        assert_eq!(probe.url().path(), "/Farm/All");
        assert_eq!(probe.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpHealthProbe::new("::nope::", "/Farm/All", Duration::from_secs(5)).is_err());
    }
}
