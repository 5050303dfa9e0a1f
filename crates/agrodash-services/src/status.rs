//! Backend reachability tracking.
//!
//! `ServerStatusMonitor` owns the only shared connectivity state. It changes
//! in response to:
//! - Health probes (timer, manual retry, network coming back)
//! - Network online/offline events
//! - Connection failures reported by unrelated API calls
//!
//! Every request for a change takes a token from one increasing counter. A
//! probe that finishes after a newer change was applied only records that a
//! check completed; it cannot overwrite the newer state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use agrodash_core::{classify, BackendConfig, ClassifiedError, ConfigError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::probe::{HealthProbe, HttpHealthProbe};

/// Whether the backend can be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// No check has completed yet
    #[default]
    Unknown,
    Online,
    Offline,
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Unknown => write!(f, "unknown"),
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub connectivity: Connectivity,
    pub last_checked: Option<DateTime<Utc>>,
    /// Consecutive connection failures since the backend was last reachable
    pub retry_count: u32,
    /// True until the first check completes
    pub is_initial_check: bool,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Unknown,
            last_checked: None,
            retry_count: 0,
            is_initial_check: true,
        }
    }
}

impl ServerStatus {
    /// `None` while unknown
    pub fn is_online(&self) -> Option<bool> {
        match self.connectivity {
            Connectivity::Unknown => None,
            Connectivity::Online => Some(true),
            Connectivity::Offline => Some(false),
        }
    }
}

/// Platform connectivity signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Online,
    Offline,
}

/// Input to the status state machine
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// The probe got an HTTP response with this status
    ProbeResponded(u16),
    /// The probe failed before a response arrived
    ProbeFailed(ClassifiedError),
    /// Some other API call could not reach the backend
    ApiConnectivityFailure,
    Network(NetworkEvent),
}

impl StatusEvent {
    fn completes_check(&self) -> bool {
        matches!(self, StatusEvent::ProbeResponded(_) | StatusEvent::ProbeFailed(_))
    }
}

fn mark_checked(status: &ServerStatus, now: DateTime<Utc>) -> ServerStatus {
    ServerStatus {
        last_checked: Some(now),
        is_initial_check: false,
        ..status.clone()
    }
}

fn reachable(status: &ServerStatus) -> ServerStatus {
    ServerStatus {
        connectivity: Connectivity::Online,
        retry_count: 0,
        ..status.clone()
    }
}

fn unreachable(status: &ServerStatus) -> ServerStatus {
    ServerStatus {
        connectivity: Connectivity::Offline,
        retry_count: status.retry_count.saturating_add(1),
        ..status.clone()
    }
}

/// Compute the status that follows `event`.
pub fn transition(status: &ServerStatus, event: &StatusEvent, now: DateTime<Utc>) -> ServerStatus {
    let next = match event {
        StatusEvent::ProbeResponded(code) if *code < 500 => reachable(status),
        // Reachable but unhealthy: offline, retry count untouched
        StatusEvent::ProbeResponded(_) => ServerStatus {
            connectivity: Connectivity::Offline,
            ..status.clone()
        },
        StatusEvent::ProbeFailed(err) if err.is_connectivity_failure() => unreachable(status),
        StatusEvent::ProbeFailed(_) => reachable(status),
        StatusEvent::ApiConnectivityFailure => unreachable(status),
        StatusEvent::Network(NetworkEvent::Online) => ServerStatus {
            connectivity: Connectivity::Online,
            ..status.clone()
        },
        StatusEvent::Network(NetworkEvent::Offline) => ServerStatus {
            connectivity: Connectivity::Offline,
            ..status.clone()
        },
    };

    if event.completes_check() {
        mark_checked(&next, now)
    } else {
        next
    }
}

/// Timing of the polling task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Period of the probe timer; probes only fire while not online
    pub poll_interval: Duration,
    /// Delay between `start()` and the first probe
    pub initial_delay: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            initial_delay: Duration::from_millis(100),
        }
    }
}

impl From<&BackendConfig> for MonitorSettings {
    fn from(config: &BackendConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            initial_delay: config.initial_check_delay(),
        }
    }
}

struct Inner {
    probe: Arc<dyn HealthProbe>,
    settings: MonitorSettings,
    status: watch::Sender<ServerStatus>,
    next_token: AtomicU64,
    /// Only read and written while the watch value is locked
    applied_token: AtomicU64,
    polling: Mutex<Option<CancellationToken>>,
}

/// Tracks backend reachability. Cheap to clone; clones share state.
///
/// Never returns errors: every failure ends up as a state change.
#[derive(Clone)]
pub struct ServerStatusMonitor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ServerStatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerStatusMonitor")
            .field("status", &*self.inner.status.borrow())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl ServerStatusMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>, settings: MonitorSettings) -> Self {
        let (status, _) = watch::channel(ServerStatus::default());
        Self {
            inner: Arc::new(Inner {
                probe,
                settings,
                status,
                next_token: AtomicU64::new(0),
                applied_token: AtomicU64::new(0),
                polling: Mutex::new(None),
            }),
        }
    }

    /// Monitor probing `GET {base_url}{health_path}` over HTTP
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let probe = HttpHealthProbe::from_config(config)?;
        tracing::info!("Monitoring backend at {}", probe.url());
        Ok(Self::new(Arc::new(probe), MonitorSettings::from(config)))
    }

    /// Current status snapshot
    pub fn status(&self) -> ServerStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver that is notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.inner.status.subscribe()
    }

    fn issue_token(&self) -> u64 {
        self.inner.next_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn apply(&self, token: u64, event: StatusEvent) -> ServerStatus {
        let now = Utc::now();
        let mut result = None;

        self.inner.status.send_if_modified(|status| {
            let applied = self.inner.applied_token.load(Ordering::SeqCst);
            let next = if token < applied {
                tracing::debug!(
                    "Ignoring stale {:?} (token {} < {})",
                    event,
                    token,
                    applied
                );
                if event.completes_check() {
                    mark_checked(status, now)
                } else {
                    status.clone()
                }
            } else {
                self.inner.applied_token.store(token, Ordering::SeqCst);
                transition(status, &event, now)
            };

            if next.connectivity != status.connectivity {
                tracing::info!(
                    "Backend {} -> {} (retry count {})",
                    status.connectivity,
                    next.connectivity,
                    next.retry_count
                );
            }

            let changed = next != *status;
            *status = next;
            result = Some(status.clone());
            changed
        });

        result.unwrap_or_else(|| self.status())
    }

    /// Probe the backend once and apply the outcome.
    pub async fn check_server_status(&self) -> ServerStatus {
        let token = self.issue_token();

        let event = match self.inner.probe.probe().await {
            Ok(code) => {
                tracing::debug!("Health probe answered {}", code);
                StatusEvent::ProbeResponded(code)
            }
            Err(failure) => {
                let classified = classify(&failure);
                tracing::warn!("Health probe failed: {}", classified);
                StatusEvent::ProbeFailed(classified)
            }
        };

        self.apply(token, event)
    }

    /// Manual retry from the UI. Does not wait for a probe already in flight.
    pub async fn retry_connection(&self) -> ServerStatus {
        self.check_server_status().await
    }

    /// Report a failure seen by some other API call.
    ///
    /// Connection failures mark the backend offline without probing. Returns
    /// whether the error was treated as a connection failure.
    pub fn handle_api_error(&self, error: &ClassifiedError) -> bool {
        if !error.is_connectivity_failure() {
            tracing::debug!("API error does not affect connectivity: {}", error);
            return false;
        }

        let token = self.issue_token();
        self.apply(token, StatusEvent::ApiConnectivityFailure);
        true
    }

    /// Apply a platform connectivity signal.
    ///
    /// `Online` marks the backend online right away and schedules a probe to
    /// confirm it; this needs a tokio runtime.
    pub fn on_network_event(&self, event: NetworkEvent) {
        tracing::info!("Network event: {:?}", event);
        let token = self.issue_token();
        self.apply(token, StatusEvent::Network(event));

        if event == NetworkEvent::Online {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let monitor = self.clone();
                    handle.spawn(async move {
                        monitor.check_server_status().await;
                    });
                }
                Err(_) => tracing::warn!("No runtime to confirm connectivity after online event"),
            }
        }
    }

    /// Start the polling task. Returns false if it is already running.
    pub fn start(&self) -> bool {
        let mut polling = self.inner.polling.lock();
        if polling.is_some() {
            tracing::debug!("Server status polling already running");
            return false;
        }

        let cancel = CancellationToken::new();
        *polling = Some(cancel.clone());
        tokio::spawn(poll_loop(Arc::downgrade(&self.inner), cancel));
        tracing::info!(
            "Server status polling started (every {:?} while not online)",
            self.inner.settings.poll_interval
        );
        true
    }

    /// Stop the polling task. A probe in flight is abandoned.
    pub fn stop(&self) {
        if let Some(cancel) = self.inner.polling.lock().take() {
            cancel.cancel();
            tracing::info!("Server status polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.polling.lock().is_some()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(cancel) = self.polling.get_mut().take() {
            cancel.cancel();
        }
    }
}

/// Probe once unless cancelled. Returns false once the loop should exit.
async fn poll_once(inner: &Weak<Inner>, cancel: &CancellationToken) -> bool {
    // Every monitor handle is gone
    let Some(inner) = inner.upgrade() else {
        return false;
    };
    let monitor = ServerStatusMonitor { inner };
    if monitor.status().connectivity == Connectivity::Online {
        return true;
    }

    tokio::select! {
        _ = monitor.check_server_status() => true,
        _ = cancel.cancelled() => false,
    }
}

/// Holds only a weak handle so dropping the last monitor ends polling.
async fn poll_loop(inner: Weak<Inner>, cancel: CancellationToken) {
    let Some(settings) = inner.upgrade().map(|inner| inner.settings) else {
        return;
    };

    tokio::select! {
        _ = tokio::time::sleep(settings.initial_delay) => {}
        _ = cancel.cancelled() => return,
    }
    if !poll_once(&inner, &cancel).await {
        return;
    }

    let mut ticker =
        tokio::time::interval_at(Instant::now() + settings.poll_interval, settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !poll_once(&inner, &cancel).await {
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    tracing::debug!("Polling loop cancelled");
}
