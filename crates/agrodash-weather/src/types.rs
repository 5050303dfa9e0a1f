use agrodash_core::ClassifiedError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Weather condition categories mapped from the provider's `weather[0].main`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Rain,
    Drizzle,
    Snow,
    Mist,
    Fog,
    Haze,
    #[default]
    Unknown,
}

impl WeatherCondition {
    /// Convert the provider's condition group name to a WeatherCondition
    pub fn from_provider(main: &str) -> Self {
        match main.trim() {
            "Clear" => Self::Clear,
            "Clouds" => Self::Clouds,
            "Rain" => Self::Rain,
            "Drizzle" => Self::Drizzle,
            "Snow" => Self::Snow,
            "Mist" => Self::Mist,
            "Fog" => Self::Fog,
            "Haze" => Self::Haze,
            _ => Self::Unknown,
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Cloudy",
            Self::Rain => "Rain",
            Self::Drizzle => "Drizzle",
            Self::Snow => "Snow",
            Self::Mist => "Mist",
            Self::Fog => "Fog",
            Self::Haze => "Haze",
            Self::Unknown => "Unknown",
        }
    }

    /// Get icon name (glyph lookup happens in the presentation layer)
    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Clear => "sun",
            Self::Clouds => "cloud",
            Self::Rain => "cloud_rain",
            Self::Drizzle => "cloud_drizzle",
            Self::Snow => "cloud_snow",
            Self::Mist | Self::Fog | Self::Haze => "cloud_fog",
            Self::Unknown => "question",
        }
    }

    /// Display line: icon, condition, and the provider's wording when it
    /// adds detail.
    pub fn label(&self, provider_description: &str) -> String {
        let detail = provider_description.trim();
        if detail.is_empty() || detail.eq_ignore_ascii_case(self.description()) {
            format!("[{}] {}", self.icon_name(), self.description())
        } else {
            format!("[{}] {} ({})", self.icon_name(), self.description(), detail)
        }
    }
}

/// Geographic coordinates in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Both values finite and within the valid degree ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Where to fetch weather for. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    ByCity(String),
    ByCoordinates(Coordinates),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::ByCity(city) => f.write_str(city),
            Location::ByCoordinates(c) => write!(f, "{:.4}, {:.4}", c.lat, c.lon),
        }
    }
}

// Provider-native response bodies. Everything optional in practice is
// optional here; defaults are decided during normalization.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    #[serde(default)]
    pub feels_like: Option<f64>,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default)]
    pub temp_min: Option<f64>,
    #[serde(default)]
    pub temp_max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionEntry {
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wind {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Precipitation {
    #[serde(rename = "1h", default)]
    pub one_hour: Option<f64>,
    #[serde(rename = "3h", default)]
    pub three_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SunAndCountry {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
}

/// Body of `GET /weather`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeatherResponse {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dt: i64,
    /// Shift from UTC in seconds for the reported location
    #[serde(default)]
    pub timezone: i32,
    pub main: MainReadings,
    #[serde(default)]
    pub weather: Vec<ConditionEntry>,
    #[serde(default)]
    pub wind: Option<Wind>,
    #[serde(default)]
    pub visibility: Option<f64>,
    #[serde(default)]
    pub rain: Option<Precipitation>,
    #[serde(default)]
    pub sys: Option<SunAndCountry>,
}

/// One 3-hour entry of `GET /forecast`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSample {
    /// Unix seconds
    pub dt: i64,
    pub main: MainReadings,
    #[serde(default)]
    pub weather: Vec<ConditionEntry>,
    #[serde(default)]
    pub wind: Option<Wind>,
    #[serde(default)]
    pub visibility: Option<f64>,
    #[serde(default)]
    pub rain: Option<Precipitation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForecastCity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub timezone: i32,
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
}

/// Body of `GET /forecast`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub list: Vec<ForecastSample>,
    #[serde(default)]
    pub city: Option<ForecastCity>,
}

/// Normalized current conditions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    /// °C, rounded
    pub temperature: i32,
    /// °C, rounded
    pub feels_like: i32,
    /// Percent
    pub humidity: u8,
    /// km/h
    pub wind_speed: f64,
    /// Degrees, meteorological
    pub wind_direction: Option<f64>,
    /// km
    pub visibility: f64,
    /// hPa
    pub pressure: u32,
    pub condition: WeatherCondition,
    pub description: String,
    pub icon: Option<String>,
    /// Local `HH:MM`
    pub sunrise: String,
    /// Local `HH:MM`
    pub sunset: String,
    pub location_name: String,
    pub country_code: String,
}

/// One representative forecast entry per calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub high: i32,
    pub low: i32,
    pub representative_temp: i32,
    pub condition: WeatherCondition,
    pub description: String,
    pub precipitation_mm: f64,
    pub humidity: u8,
    /// km/h
    pub wind_speed: f64,
}

/// Forecast half of an aggregate fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Available(Vec<ForecastDay>),
    /// The forecast call failed; current conditions are still valid
    Unavailable(ClassifiedError),
    NotRequested,
}

impl ForecastOutcome {
    pub fn days(&self) -> &[ForecastDay] {
        match self {
            ForecastOutcome::Available(days) => days,
            _ => &[],
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ForecastOutcome::Unavailable(_))
    }
}

/// Complete result of one fetch cycle
#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub location: Location,
    pub current: WeatherSnapshot,
    pub forecast: ForecastOutcome,
    pub fetched_at: DateTime<Utc>,
}
