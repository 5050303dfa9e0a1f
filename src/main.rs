use std::sync::Arc;

use agrodash_core::{AppError, Config};
use agrodash_services::ServerStatusMonitor;
use agrodash_weather::{
    day_label, Coordinates, FetchOptions, ForecastOutcome, Location, LocationResolver,
    PositionOptions, StaticPositionSource, WeatherAggregator, WeatherClient, WeatherReport,
};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    agrodash_core::init()?;

    let (config, _) = Config::load_validated()?;
    tracing::info!("AgroDash started");

    let monitor = ServerStatusMonitor::from_config(&config.backend)?;
    monitor.start();

    match resolve_location(&config).await {
        Ok(Some(location)) => show_weather(&config, &location).await,
        Ok(None) => println!("No location: pass a city or set one in the config file"),
        Err(e) => println!("{}", e.user_message()),
    }

    let mut status = monitor.subscribe();
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                println!(
                    "Backend {} (retries: {})",
                    current.connectivity, current.retry_count
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    monitor.stop();
    tracing::info!("AgroDash shutting down");
    Ok(())
}

/// City argument, then configured city, then configured coordinates.
async fn resolve_location(config: &Config) -> Result<Option<Location>, AppError> {
    let city = std::env::args()
        .nth(1)
        .or_else(|| config.weather.default_city.clone());
    if let Some(city) = city {
        return Ok(Some(Location::ByCity(city)));
    }

    let Some((lat, lon)) = config.location.fixed_position() else {
        return Ok(None);
    };

    let resolver = LocationResolver::new(
        Arc::new(StaticPositionSource::new(Coordinates::new(lat, lon))),
        PositionOptions::from(&config.location),
    );
    let coords = resolver.resolve_current_location().await?;
    Ok(Some(Location::ByCoordinates(coords)))
}

async fn show_weather(config: &Config, location: &Location) {
    let client = match WeatherClient::from_config(&config.weather) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Weather disabled: {}", e);
            println!("{}", e.user_message());
            return;
        }
    };

    let aggregator = WeatherAggregator::new(client).with_forecast_days(config.weather.forecast_days);
    match aggregator
        .fetch_current_and_forecast(location, FetchOptions::default())
        .await
    {
        Ok(report) => print_report(&report),
        Err(e) => {
            tracing::warn!("Weather fetch failed: {}", e);
            println!("{}", AppError::from(e).user_message());
        }
    }
}

fn print_report(report: &WeatherReport) {
    let current = &report.current;
    println!("{}, {}", current.location_name, current.country_code);
    println!(
        "  {}°C (feels like {}°C), {}",
        current.temperature,
        current.feels_like,
        current.condition.label(&current.description)
    );
    println!(
        "  Humidity {}%  Wind {:.1} km/h  Visibility {:.1} km  Pressure {} hPa",
        current.humidity, current.wind_speed, current.visibility, current.pressure
    );
    println!("  Sunrise {}  Sunset {}", current.sunrise, current.sunset);

    let today = chrono::Local::now().date_naive();
    match &report.forecast {
        ForecastOutcome::Available(days) => {
            for day in days {
                println!(
                    "  {:<5} {:>3}° / {:>3}°  {}",
                    day_label(day.date, today),
                    day.high,
                    day.low,
                    day.condition.label(&day.description)
                );
            }
        }
        ForecastOutcome::Unavailable(e) => println!("  Forecast unavailable: {}", e.user_message()),
        ForecastOutcome::NotRequested => {}
    }
}
