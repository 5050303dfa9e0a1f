//! Current-position lookup on top of a callback-based platform API.
//!
//! Each resolution is tagged with a token. Only the newest request may store
//! its fix; anything older settles with `LocationError::Superseded` and its
//! platform request is cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agrodash_core::{LocationConfig, LocationError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::types::Coordinates;

/// Options handed to the platform with each request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// A cached fix younger than this is acceptable
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(300),
        }
    }
}

impl From<&LocationConfig> for PositionOptions {
    fn from(config: &LocationConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: config.timeout(),
            maximum_age: config.max_age(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub coords: Coordinates,
    pub accuracy_meters: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Errors reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl From<PositionError> for LocationError {
    fn from(e: PositionError) -> Self {
        match e {
            PositionError::PermissionDenied => LocationError::PermissionDenied,
            PositionError::PositionUnavailable => LocationError::ServiceUnavailable,
            PositionError::Timeout => LocationError::Timeout,
        }
    }
}

pub type PositionCallback = Box<dyn FnOnce(Result<PositionFix, PositionError>) + Send>;

/// Platform location service. Implementations call `callback` at most once.
/// `cancel` fires when the caller has stopped waiting.
pub trait PositionSource: Send + Sync {
    fn request_position(
        &self,
        options: PositionOptions,
        cancel: CancellationToken,
        callback: PositionCallback,
    );
}

/// Serves one configured position. Used where no location service exists.
#[derive(Debug, Clone, Copy)]
pub struct StaticPositionSource {
    coords: Coordinates,
}

impl StaticPositionSource {
    pub fn new(coords: Coordinates) -> Self {
        Self { coords }
    }
}

impl PositionSource for StaticPositionSource {
    fn request_position(
        &self,
        _options: PositionOptions,
        _cancel: CancellationToken,
        callback: PositionCallback,
    ) {
        callback(Ok(PositionFix {
            coords: self.coords,
            accuracy_meters: None,
            timestamp: Utc::now(),
        }));
    }
}

/// Resolves the current position with a timeout, reuse of recent fixes and
/// stale-result rejection.
pub struct LocationResolver {
    source: Arc<dyn PositionSource>,
    options: PositionOptions,
    latest: AtomicU64,
    /// Platform request still waiting for an answer, by request token
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
    last_fix: Mutex<Option<PositionFix>>,
}

impl LocationResolver {
    pub fn new(source: Arc<dyn PositionSource>, options: PositionOptions) -> Self {
        Self {
            source,
            options,
            latest: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            last_fix: Mutex::new(None),
        }
    }

    /// The most recent fix accepted by this resolver
    pub fn last_fix(&self) -> Option<PositionFix> {
        *self.last_fix.lock()
    }

    /// Abort any pending resolution. It settles with `Superseded`.
    pub fn cancel(&self) {
        let mut in_flight = self.in_flight.lock();
        self.latest.fetch_add(1, Ordering::SeqCst);
        if let Some((token, cancel)) = in_flight.take() {
            tracing::debug!("Cancelling location request {}", token);
            cancel.cancel();
        }
    }

    /// Issue a token for a new request, aborting the one it replaces.
    fn begin(&self, cancel: CancellationToken) -> u64 {
        let mut in_flight = self.in_flight.lock();
        let token = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((older, previous)) = in_flight.replace((token, cancel)) {
            tracing::debug!("Location request {} replaced by {}", older, token);
            previous.cancel();
        }
        token
    }

    fn finish(&self, token: u64) {
        let mut in_flight = self.in_flight.lock();
        if matches!(*in_flight, Some((current, _)) if current == token) {
            *in_flight = None;
        }
    }

    fn fresh_fix(&self) -> Option<PositionFix> {
        let fix = (*self.last_fix.lock())?;
        let age = Utc::now().signed_duration_since(fix.timestamp).to_std().ok()?;
        (age <= self.options.maximum_age).then_some(fix)
    }

    pub async fn resolve_current_location(&self) -> Result<Coordinates, LocationError> {
        let cancel = CancellationToken::new();
        let token = self.begin(cancel.clone());

        if let Some(fix) = self.fresh_fix() {
            self.finish(token);
            tracing::debug!("Reusing location fix from {}", fix.timestamp);
            return Ok(fix.coords);
        }

        let (tx, rx) = oneshot::channel();
        self.source.request_position(
            self.options,
            cancel.clone(),
            Box::new(move |result| {
                // The receiver is gone once the request timed out or was cancelled
                let _ = tx.send(result);
            }),
        );

        let outcome = tokio::select! {
            answer = tokio::time::timeout(self.options.timeout, rx) => match answer {
                Ok(Ok(result)) => result.map_err(LocationError::from),
                Ok(Err(_)) => {
                    tracing::warn!("Location source dropped the request without answering");
                    Err(LocationError::ServiceUnavailable)
                }
                Err(_) => {
                    cancel.cancel();
                    tracing::warn!("Location request timed out after {:?}", self.options.timeout);
                    Err(LocationError::Timeout)
                }
            },
            _ = cancel.cancelled() => {
                tracing::debug!("Location request {} aborted", token);
                return Err(LocationError::Superseded);
            }
        };
        self.finish(token);

        if self.latest.load(Ordering::SeqCst) != token {
            tracing::debug!("Discarding stale location result (request {})", token);
            return Err(LocationError::Superseded);
        }

        let fix = outcome?;
        tracing::info!("Got location: {}, {}", fix.coords.lat, fix.coords.lon);
        *self.last_fix.lock() = Some(fix);
        Ok(fix.coords)
    }
}
