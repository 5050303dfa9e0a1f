//! Turns provider bodies into view models.
//!
//! Current conditions and the forecast are fetched together. A failed
//! forecast is reported next to a valid snapshot; a failed current fetch
//! fails the whole cycle. Nothing is invented to fill the gap.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agrodash_core::{AppError, ClassifiedError};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use thiserror::Error;

use crate::client::WeatherClient;
use crate::types::{
    ConditionEntry, CurrentWeatherResponse, ForecastDay, ForecastOutcome, ForecastSample,
    Location, WeatherCondition, WeatherReport, WeatherSnapshot,
};

/// Local hours (inclusive) from which a day's representative sample is chosen
pub const REPRESENTATIVE_HOURS: std::ops::RangeInclusive<u32> = 12..=15;

pub const DEFAULT_FORECAST_DAYS: usize = 5;

/// The provider reports at most 10 km and omits the field at that value
pub const DEFAULT_VISIBILITY_METERS: f64 = 10_000.0;

const MISSING_CLOCK: &str = "--:--";

/// Aggregate fetch errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeatherError {
    #[error(transparent)]
    Request(#[from] ClassifiedError),

    /// A newer fetch started before this one settled
    #[error("Weather request superseded by a newer one")]
    Superseded,
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::Request(_) => "Weather unavailable. Please try again.",
            WeatherError::Superseded => "Refreshing…",
        }
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::Request(classified) => AppError::Request(classified),
            WeatherError::Superseded => AppError::Superseded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub include_forecast: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            include_forecast: true,
        }
    }
}

/// Fetches and normalizes weather for the presentation layer
#[derive(Debug, Clone)]
pub struct WeatherAggregator {
    client: WeatherClient,
    forecast_days: usize,
    generation: Arc<AtomicU64>,
}

impl WeatherAggregator {
    pub fn new(client: WeatherClient) -> Self {
        Self {
            client,
            forecast_days: DEFAULT_FORECAST_DAYS,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_forecast_days(mut self, days: usize) -> Self {
        self.forecast_days = days;
        self
    }

    /// Make any fetch still in flight return `Superseded`.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Fetch current conditions and, optionally, the forecast.
    ///
    /// Both requests are issued before either is awaited and the result is
    /// assembled only after both have settled.
    pub async fn fetch_current_and_forecast(
        &self,
        location: &Location,
        options: FetchOptions,
    ) -> Result<WeatherReport, WeatherError> {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Fetching weather for {} (request {})", location, token);

        let forecast = async {
            if options.include_forecast {
                Some(self.client.forecast(location).await)
            } else {
                None
            }
        };
        let (current, forecast) = tokio::join!(self.client.current(location), forecast);

        if self.generation.load(Ordering::SeqCst) != token {
            tracing::debug!("Discarding weather request {} for {}", token, location);
            return Err(WeatherError::Superseded);
        }

        let current = current?;
        let snapshot = normalize_current(&current);

        let forecast = match forecast {
            None => ForecastOutcome::NotRequested,
            Some(Ok(raw)) => {
                let offset = raw
                    .city
                    .as_ref()
                    .map(|c| c.timezone)
                    .unwrap_or(current.timezone);
                ForecastOutcome::Available(bucket_forecast(&raw.list, offset, self.forecast_days))
            }
            Some(Err(e)) => {
                tracing::warn!("Forecast unavailable for {}: {}", location, e);
                ForecastOutcome::Unavailable(e)
            }
        };

        Ok(WeatherReport {
            location: location.clone(),
            current: snapshot,
            forecast,
            fetched_at: Utc::now(),
        })
    }
}

/// m/s to km/h
pub fn ms_to_kmh(speed: f64) -> f64 {
    speed * 3.6
}

pub fn meters_to_km(meters: f64) -> f64 {
    meters / 1000.0
}

fn round_temp(celsius: f64) -> i32 {
    celsius.round() as i32
}

fn humidity_percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

fn utc_offset(seconds: i32) -> FixedOffset {
    FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix())
}

fn local_time(unix: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(unix, 0).map(|t| t.with_timezone(&offset))
}

fn clock(unix: Option<i64>, offset: FixedOffset) -> String {
    unix.and_then(|t| local_time(t, offset))
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| MISSING_CLOCK.to_string())
}

fn primary_condition(entries: &[ConditionEntry]) -> (WeatherCondition, String, Option<String>) {
    match entries.first() {
        Some(entry) => (
            WeatherCondition::from_provider(&entry.main),
            entry.description.clone(),
            entry.icon.clone(),
        ),
        None => (WeatherCondition::Unknown, String::new(), None),
    }
}

/// Normalize a `/weather` body
pub fn normalize_current(raw: &CurrentWeatherResponse) -> WeatherSnapshot {
    let offset = utc_offset(raw.timezone);
    let (condition, description, icon) = primary_condition(&raw.weather);
    let wind = raw.wind.clone().unwrap_or_default();
    let sys = raw.sys.clone().unwrap_or_default();

    WeatherSnapshot {
        temperature: round_temp(raw.main.temp),
        feels_like: round_temp(raw.main.feels_like.unwrap_or(raw.main.temp)),
        humidity: humidity_percent(raw.main.humidity),
        wind_speed: ms_to_kmh(wind.speed),
        wind_direction: wind.deg,
        visibility: meters_to_km(raw.visibility.unwrap_or(DEFAULT_VISIBILITY_METERS)),
        pressure: raw.main.pressure.round().max(0.0) as u32,
        condition,
        description,
        icon,
        sunrise: clock(sys.sunrise, offset),
        sunset: clock(sys.sunset, offset),
        location_name: raw.name.clone(),
        country_code: sys.country.unwrap_or_default(),
    }
}

#[derive(Default)]
struct DayBucket<'a> {
    high: Option<f64>,
    low: Option<f64>,
    representative: Option<&'a ForecastSample>,
}

/// Reduce 3-hour samples to one entry per local calendar day.
///
/// Within a day the first sample whose local hour falls in
/// [`REPRESENTATIVE_HOURS`] is used; days with no such sample are left out.
/// High and low span every sample of the day. Output is ascending by date
/// and holds at most `max_days` entries.
pub fn bucket_forecast(
    samples: &[ForecastSample],
    utc_offset_secs: i32,
    max_days: usize,
) -> Vec<ForecastDay> {
    let offset = utc_offset(utc_offset_secs);
    let mut days: BTreeMap<NaiveDate, DayBucket<'_>> = BTreeMap::new();

    for sample in samples {
        let Some(local) = local_time(sample.dt, offset) else {
            tracing::debug!("Skipping forecast sample with invalid timestamp {}", sample.dt);
            continue;
        };

        let bucket = days.entry(local.date_naive()).or_default();
        let max = sample.main.temp_max.unwrap_or(sample.main.temp);
        let min = sample.main.temp_min.unwrap_or(sample.main.temp);
        bucket.high = Some(bucket.high.map_or(max, |h| h.max(max)));
        bucket.low = Some(bucket.low.map_or(min, |l| l.min(min)));

        if bucket.representative.is_none() && REPRESENTATIVE_HOURS.contains(&local.hour()) {
            bucket.representative = Some(sample);
        }
    }

    days.into_iter()
        .filter_map(|(date, bucket)| {
            let sample = bucket.representative?;
            let (condition, description, _) = primary_condition(&sample.weather);
            Some(ForecastDay {
                date,
                high: round_temp(bucket.high.unwrap_or(sample.main.temp)),
                low: round_temp(bucket.low.unwrap_or(sample.main.temp)),
                representative_temp: round_temp(sample.main.temp),
                condition,
                description,
                precipitation_mm: sample
                    .rain
                    .as_ref()
                    .and_then(|r| r.three_hours)
                    .unwrap_or(0.0),
                humidity: humidity_percent(sample.main.humidity),
                wind_speed: ms_to_kmh(sample.wind.as_ref().map_or(0.0, |w| w.speed)),
            })
        })
        .take(max_days)
        .collect()
}

/// "Today" for the current date, otherwise the short weekday name
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else {
        date.format("%a").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MainReadings, Precipitation, SunAndCountry, Wind};
    use chrono::{NaiveDateTime, TimeZone};

    const IST: i32 = 19_800; // UTC+05:30

    fn unix_local(date: &str, hour: u32, offset_secs: i32) -> i64 {
        let naive = NaiveDateTime::parse_from_str(
            &format!("{date} {hour:02}:00:00"),
            "%Y-%m-%d %H:%M:%S",
        )
        .unwrap();
        utc_offset(offset_secs)
            .from_local_datetime(&naive)
            .unwrap()
            .timestamp()
    }

    fn sample(dt: i64, temp: f64) -> ForecastSample {
        ForecastSample {
            dt,
            main: MainReadings {
                temp,
                feels_like: None,
                humidity: 40.0,
                pressure: 1008.0,
                temp_min: Some(temp - 1.0),
                temp_max: Some(temp + 1.0),
            },
            weather: vec![ConditionEntry {
                main: "Clear".into(),
                description: format!("sample at {temp}"),
                icon: None,
            }],
            wind: Some(Wind { speed: 10.0, deg: None }),
            visibility: None,
            rain: None,
        }
    }

    #[test]
    fn test_unit_conversions_are_exact() {
        assert!((ms_to_kmh(10.0) - 36.0).abs() < 1e-9);
        assert_eq!(meters_to_km(8000.0), 8.0);
    }

    #[test]
    fn test_rajkot_noon_sample_is_selected() {
        let samples: Vec<_> = [9, 12, 15, 18]
            .into_iter()
            .map(|h| sample(unix_local("2026-03-10", h, IST), f64::from(h) + 20.0))
            .collect();

        let days = bucket_forecast(&samples, IST, 5);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        assert_eq!(days[0].representative_temp, 32);
        assert_eq!(days[0].description, "sample at 32");
        // High/low cover the whole day: 29-1 .. 38+1
        assert_eq!(days[0].low, 28);
        assert_eq!(days[0].high, 39);
    }

    #[test]
    fn test_first_sample_in_window_wins() {
        let samples = vec![
            sample(unix_local("2026-03-10", 13, 0), 25.0),
            sample(unix_local("2026-03-10", 12, 0), 22.0),
        ];
        let days = bucket_forecast(&samples, 0, 5);
        assert_eq!(days[0].representative_temp, 25);
    }

    #[test]
    fn test_day_without_window_sample_is_omitted() {
        let samples = vec![
            sample(unix_local("2026-03-10", 0, 0), 15.0),
            sample(unix_local("2026-03-10", 21, 0), 16.0),
            sample(unix_local("2026-03-11", 15, 0), 30.0),
        ];
        let days = bucket_forecast(&samples, 0, 5);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
    }

    #[test]
    fn test_output_sorted_and_truncated() {
        let mut samples: Vec<_> = (1..=7)
            .map(|d| sample(unix_local(&format!("2026-03-{d:02}"), 12, 0), f64::from(d)))
            .collect();
        samples.reverse();

        let days = bucket_forecast(&samples, 0, 5);
        assert_eq!(days.len(), 5);
        assert!(days.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn test_bucketing_is_idempotent() {
        let samples: Vec<_> = (0..40)
            .map(|i| sample(unix_local("2026-03-01", 0, IST) + i * 3 * 3600, 20.0 + i as f64 / 4.0))
            .collect();
        let first = bucket_forecast(&samples, IST, 5);
        let second = bucket_forecast(&samples, IST, 5);
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn test_timezone_shifts_calendar_day() {
        // 20:00 UTC on the 10th is 01:30 on the 11th in IST
        let late = unix_local("2026-03-10", 20, 0);
        let days = bucket_forecast(&[sample(late, 20.0)], IST, 5);
        assert!(days.is_empty());

        // 08:00 UTC is 13:30 IST, inside the window
        let morning_utc = unix_local("2026-03-10", 8, 0);
        let days = bucket_forecast(&[sample(morning_utc, 20.0)], IST, 5);
        assert_eq!(days.len(), 1);
    }

    #[test]
    fn test_precipitation_defaults_to_zero() {
        let mut wet = sample(unix_local("2026-03-10", 12, 0), 20.0);
        wet.rain = Some(Precipitation {
            one_hour: None,
            three_hours: Some(1.25),
        });
        let dry = sample(unix_local("2026-03-11", 12, 0), 20.0);

        let days = bucket_forecast(&[wet, dry], 0, 5);
        assert_eq!(days[0].precipitation_mm, 1.25);
        assert_eq!(days[1].precipitation_mm, 0.0);
        assert!((days[0].wind_speed - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_current() {
        let raw = CurrentWeatherResponse {
            name: "Rajkot".into(),
            dt: 0,
            timezone: IST,
            main: MainReadings {
                temp: 31.6,
                feels_like: Some(33.4),
                humidity: 48.0,
                pressure: 1006.0,
                temp_min: None,
                temp_max: None,
            },
            weather: vec![ConditionEntry {
                main: "Haze".into(),
                description: "haze".into(),
                icon: Some("50d".into()),
            }],
            wind: Some(Wind {
                speed: 10.0,
                deg: Some(270.0),
            }),
            visibility: Some(8000.0),
            rain: None,
            sys: Some(SunAndCountry {
                country: Some("IN".into()),
                sunrise: Some(Utc.with_ymd_and_hms(2026, 3, 10, 1, 30, 0).unwrap().timestamp()),
                sunset: Some(Utc.with_ymd_and_hms(2026, 3, 10, 13, 15, 0).unwrap().timestamp()),
            }),
        };

        let snap = normalize_current(&raw);
        assert_eq!(snap.temperature, 32);
        assert_eq!(snap.feels_like, 33);
        assert_eq!(snap.humidity, 48);
        assert!((snap.wind_speed - 36.0).abs() < 1e-9);
        assert_eq!(snap.visibility, 8.0);
        assert_eq!(snap.pressure, 1006);
        assert_eq!(snap.condition, WeatherCondition::Haze);
        assert_eq!(snap.sunrise, "07:00");
        assert_eq!(snap.sunset, "18:45");
        assert_eq!(snap.location_name, "Rajkot");
        assert_eq!(snap.country_code, "IN");
    }

    #[test]
    fn test_normalize_current_defaults() {
        let raw: CurrentWeatherResponse =
            serde_json::from_value(serde_json::json!({ "main": { "temp": -0.4 } })).unwrap();
        let snap = normalize_current(&raw);
        assert_eq!(snap.temperature, 0);
        assert_eq!(snap.feels_like, 0);
        assert_eq!(snap.condition, WeatherCondition::Unknown);
        assert_eq!(snap.description, "");
        assert_eq!(snap.visibility, 10.0);
        assert_eq!(snap.wind_speed, 0.0);
        assert_eq!(snap.sunrise, "--:--");
        assert_eq!(snap.country_code, "");
    }

    #[test]
    fn test_day_label() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(day_label(today.succ_opt().unwrap(), today), "Tue");
    }

    #[test]
    fn test_weather_error_maps_to_app_error() {
        let app: AppError = WeatherError::Superseded.into();
        assert!(matches!(app, AppError::Superseded));
    }
}
