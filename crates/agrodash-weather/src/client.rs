//! Raw calls to the weather provider.
//!
//! Each call validates its input, issues one GET and returns the provider's
//! body unchanged. Failures come back already classified. No retries here.

use std::sync::Arc;
use std::time::Duration;

use agrodash_core::{classify, ClassifiedError, ConfigError, FailureDescriptor, WeatherConfig};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::types::{Coordinates, CurrentWeatherResponse, ForecastResponse, Location};

const CURRENT_PATH: &str = "weather";
const FORECAST_PATH: &str = "forecast";
const UNITS: &str = "metric";

/// Error body the provider returns alongside non-2xx statuses
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the OpenWeatherMap-compatible API
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Arc<Client>,
    base_url: Url,
    api_key: String,
}

impl WeatherClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ConfigError> {
        // A trailing slash makes `Url::join` append instead of replacing the last segment
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| ConfigError::Invalid(format!("weather base URL: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            base_url,
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self, ConfigError> {
        let api_key = config.require_api_key()?;
        Self::new(&config.base_url, api_key, config.request_timeout())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn current_by_city(
        &self,
        city: &str,
    ) -> Result<CurrentWeatherResponse, ClassifiedError> {
        let city = validate_city(city)?;
        self.get(CURRENT_PATH, &[("q", city.to_string())]).await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn current_by_coordinates(
        &self,
        coords: Coordinates,
    ) -> Result<CurrentWeatherResponse, ClassifiedError> {
        validate_coordinates(coords)?;
        self.get(CURRENT_PATH, &coordinate_query(coords)).await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn forecast_by_city(&self, city: &str) -> Result<ForecastResponse, ClassifiedError> {
        let city = validate_city(city)?;
        self.get(FORECAST_PATH, &[("q", city.to_string())]).await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn forecast_by_coordinates(
        &self,
        coords: Coordinates,
    ) -> Result<ForecastResponse, ClassifiedError> {
        validate_coordinates(coords)?;
        self.get(FORECAST_PATH, &coordinate_query(coords)).await
    }

    /// Current conditions for either location variant
    pub async fn current(&self, location: &Location) -> Result<CurrentWeatherResponse, ClassifiedError> {
        match location {
            Location::ByCity(city) => self.current_by_city(city).await,
            Location::ByCoordinates(coords) => self.current_by_coordinates(*coords).await,
        }
    }

    /// 3-hour forecast for either location variant
    pub async fn forecast(&self, location: &Location) -> Result<ForecastResponse, ClassifiedError> {
        match location {
            Location::ByCity(city) => self.forecast_by_city(city).await,
            Location::ByCoordinates(coords) => self.forecast_by_coordinates(*coords).await,
        }
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url, ClassifiedError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ClassifiedError::invalid_input(format!("bad endpoint {path}: {e}")))?;

        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .append_pair("appid", &self.api_key)
            .append_pair("units", UNITS);

        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ClassifiedError> {
        let url = self.endpoint(path, params)?;
        tracing::debug!("GET {}/{}", self.base_url.as_str().trim_end_matches('/'), path);

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                // The URL carries the API key
                let e = e.without_url();
                let classified = classify(&FailureDescriptor::from_reqwest(&e));
                tracing::warn!("Weather request failed ({}): {}", classified.category, e);
                return Err(classified);
            }
        };

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                let e = e.without_url();
                tracing::warn!("Weather response parse error: {}", e);
                classify(&FailureDescriptor::from_reqwest(&e))
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ProviderErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| status.to_string());

        let classified = classify(&FailureDescriptor::http_status(status.as_u16(), message));
        tracing::warn!(
            "Weather provider returned {} ({}): {}",
            status,
            classified.category,
            classified.message
        );
        Err(classified)
    }
}

fn validate_city(city: &str) -> Result<&str, ClassifiedError> {
    let trimmed = city.trim();
    if trimmed.is_empty() {
        return Err(ClassifiedError::invalid_input("City name must not be empty"));
    }
    Ok(trimmed)
}

fn validate_coordinates(coords: Coordinates) -> Result<(), ClassifiedError> {
    if !coords.is_valid() {
        return Err(ClassifiedError::invalid_input(format!(
            "Invalid coordinates: {}, {}",
            coords.lat, coords.lon
        )));
    }
    Ok(())
}

fn coordinate_query(coords: Coordinates) -> [(&'static str, String); 2] {
    [("lat", coords.lat.to_string()), ("lon", coords.lon.to_string())]
}
