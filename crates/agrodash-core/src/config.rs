use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

pub const ENV_BACKEND_URL: &str = "AGRODASH_BACKEND_URL";
pub const ENV_WEATHER_URL: &str = "AGRODASH_WEATHER_URL";
pub const ENV_WEATHER_API_KEY: &str = "AGRODASH_WEATHER_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend API settings (health probing)
    #[serde(default)]
    pub backend: BackendConfig,

    /// Weather provider settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Geolocation settings
    #[serde(default)]
    pub location: LocationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the farm API
    pub base_url: String,

    /// Path probed for liveness; the response body is ignored
    #[serde(default = "default_health_path")]
    pub health_path: String,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Poll period while the backend is not online
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay before the first check after start
    #[serde(default = "default_initial_check_delay_ms")]
    pub initial_check_delay_ms: u64,
}

fn default_health_path() -> String {
    "/Farm/All".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_initial_check_delay_ms() -> u64 {
    100
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            health_path: default_health_path(),
            probe_timeout_secs: default_probe_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            initial_check_delay_ms: default_initial_check_delay_ms(),
        }
    }
}

impl BackendConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_check_delay(&self) -> Duration {
        Duration::from_millis(self.initial_check_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the OpenWeatherMap-compatible API
    pub base_url: String,

    /// Provider API key. Usually supplied through the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of forecast days to keep
    #[serde(default = "default_forecast_days")]
    pub forecast_days: usize,

    /// City used when no location is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_city: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_forecast_days() -> usize {
    5
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            forecast_days: default_forecast_days(),
            default_city: None,
        }
    }
}

impl WeatherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The API key, or an error naming the variable that supplies it.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingSetting(ENV_WEATHER_API_KEY.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_location_timeout_secs")]
    pub timeout_secs: u64,

    /// A fix younger than this is reused without asking the platform
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,

    /// Fixed position used when the platform has no location service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

fn default_location_timeout_secs() -> u64 {
    10
}

fn default_max_age_secs() -> u64 {
    300
}

fn default_high_accuracy() -> bool {
    true
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_location_timeout_secs(),
            max_age_secs: default_max_age_secs(),
            high_accuracy: default_high_accuracy(),
            latitude: None,
            longitude: None,
        }
    }
}

impl LocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn fixed_position(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

impl Config {
    /// Load configuration from the default file (if any), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific TOML file. No environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Apply overrides from a variable lookup. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_BACKEND_URL) {
            tracing::debug!("Backend URL overridden from {}", ENV_BACKEND_URL);
            self.backend.base_url = url;
        }
        if let Some(url) = get(ENV_WEATHER_URL) {
            tracing::debug!("Weather URL overridden from {}", ENV_WEATHER_URL);
            self.weather.base_url = url;
        }
        if let Some(key) = get(ENV_WEATHER_API_KEY) {
            self.weather.api_key = Some(key);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        validate_url(&self.backend.base_url, "backend.base_url", &mut result);
        validate_url(&self.weather.base_url, "weather.base_url", &mut result);

        if !self.backend.health_path.starts_with('/') {
            result.add_error("backend.health_path", "Path must start with '/'");
        }

        if self.backend.probe_timeout_secs == 0 {
            result.add_error("backend.probe_timeout_secs", "Timeout must be greater than 0");
        }
        if self.backend.poll_interval_secs == 0 {
            result.add_error("backend.poll_interval_secs", "Interval must be greater than 0");
        } else if self.backend.poll_interval_secs < self.backend.probe_timeout_secs {
            result.add_warning(
                "backend.poll_interval_secs",
                "Poll interval is shorter than the probe timeout",
            );
        }

        if self.weather.request_timeout_secs == 0 {
            result.add_error("weather.request_timeout_secs", "Timeout must be greater than 0");
        }
        if self.weather.forecast_days == 0 {
            result.add_warning("weather.forecast_days", "Forecast disabled (0 days)");
        }
        if self.weather.require_api_key().is_err() {
            result.add_warning(
                "weather.api_key",
                format!("No API key set ({}); weather will be unavailable", ENV_WEATHER_API_KEY),
            );
        }

        if self.location.timeout_secs == 0 {
            result.add_error("location.timeout_secs", "Timeout must be greater than 0");
        }
        match (self.location.latitude, self.location.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    result.add_error("location.latitude", "Latitude must be within -90..=90");
                }
                if !(-180.0..=180.0).contains(&lon) {
                    result.add_error("location.longitude", "Longitude must be within -180..=180");
                }
            }
            (None, None) => {}
            _ => result.add_warning(
                "location",
                "Both latitude and longitude are needed for a fixed position",
            ),
        }

        result
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a TOML file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("agrodash");

        Ok(config_dir.join("config.toml"))
    }
}

/// Validate a URL field
fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }

            if url.port() == Some(0) {
                result.add_error(field_name, "Port cannot be 0");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
