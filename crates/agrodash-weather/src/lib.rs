//! Weather data for AgroDash
//!
//! Fetches current conditions and the 3-hour forecast from an
//! OpenWeatherMap-compatible provider, normalizes both into view models and
//! resolves the device position when no city is given.

pub mod aggregate;
pub mod client;
pub mod location;
pub mod types;

pub use aggregate::{bucket_forecast, day_label, FetchOptions, WeatherAggregator, WeatherError};
pub use client::WeatherClient;
pub use location::{
    LocationResolver, PositionCallback, PositionError, PositionFix, PositionOptions,
    PositionSource, StaticPositionSource,
};
pub use types::*;
