//! Failure classification for outbound HTTP calls.
//!
//! Every failure is first normalized into a [`FailureDescriptor`] and then
//! mapped to exactly one [`ErrorCategory`]:
//! - Timeouts and aborted requests
//! - Connection failures (refused, unreachable, DNS)
//! - 5xx server errors
//! - 4xx client errors
//!
//! Only the first two mean the network path is broken. A backend that answers
//! with 401 or 404 is still reachable.

use serde::Serialize;
use thiserror::Error;

/// Message fragments that identify a connection failure when no structured
/// signal is available. Matched case-insensitively.
pub const CONNECTION_FAILURE_MARKERS: &[&str] = &[
    "connection refused",
    "err_connection_refused",
    "network is unreachable",
    "network unreachable",
    "err_network",
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "err_name_not_resolved",
    "failed to fetch",
];

/// Broad failure category used for connectivity decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    ConnectionRefused,
    ServerError,
    ClientError,
    Unknown,
}

impl ErrorCategory {
    /// True for the categories that mean the remote end could not be reached.
    pub fn is_connectivity(self) -> bool {
        matches!(self, ErrorCategory::Timeout | ErrorCategory::ConnectionRefused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ConnectionRefused => "connection_refused",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure after classification. Computed once, passed along unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{category}: {message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
    pub http_status: Option<u16>,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            http_status: None,
        }
    }

    /// Rejected input that never reached the network.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ClientError, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn is_connectivity_failure(&self) -> bool {
        self.category.is_connectivity()
    }

    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> &'static str {
        match self.category {
            ErrorCategory::Timeout => "The request timed out. Please try again.",
            ErrorCategory::ConnectionRefused => {
                "Unable to connect. Check your internet connection."
            }
            ErrorCategory::ServerError => {
                "The server is experiencing issues. Please try again later."
            }
            ErrorCategory::ClientError if self.http_status == Some(401) => {
                "The request was not authorized. Check your settings."
            }
            ErrorCategory::ClientError if self.http_status == Some(404) => {
                "Not found. Check and try again."
            }
            ErrorCategory::ClientError => "The request failed. Please try again.",
            ErrorCategory::Unknown => "Something went wrong. Please try again.",
        }
    }
}

/// Normalized view of a raw failure, independent of where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureDescriptor {
    /// The call was aborted because its deadline passed.
    pub timed_out: bool,
    /// The transport reported that no connection could be established.
    pub connect_failed: bool,
    pub http_status: Option<u16>,
    pub message: String,
}

impl FailureDescriptor {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            message: message.into(),
            ..Self::default()
        }
    }

    /// A completed response with a non-success status.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            http_status: Some(status),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Normalize a reqwest error. The message includes the full source chain,
    /// since reqwest's own `Display` hides the underlying io error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        Self {
            timed_out: err.is_timeout(),
            connect_failed: err.is_connect(),
            http_status: err.status().map(|s| s.as_u16()),
            message: error_chain(err),
        }
    }
}

impl From<&reqwest::Error> for FailureDescriptor {
    fn from(err: &reqwest::Error) -> Self {
        Self::from_reqwest(err)
    }
}

/// Classify a failure. Rules apply in priority order; first match wins.
pub fn classify(failure: &FailureDescriptor) -> ClassifiedError {
    let category = if failure.timed_out {
        ErrorCategory::Timeout
    } else if failure.connect_failed || matches_connection_marker(&failure.message) {
        ErrorCategory::ConnectionRefused
    } else {
        match failure.http_status {
            Some(status) if status >= 500 => ErrorCategory::ServerError,
            Some(status) if (400..500).contains(&status) => ErrorCategory::ClientError,
            _ => ErrorCategory::Unknown,
        }
    };

    ClassifiedError {
        category,
        message: failure.message.clone(),
        http_status: failure.http_status,
    }
}

fn matches_connection_marker(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CONNECTION_FAILURE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_wins_over_everything() {
        let failure = FailureDescriptor {
            timed_out: true,
            connect_failed: true,
            http_status: Some(503),
            message: "connection refused".into(),
        };
        assert_eq!(classify(&failure).category, ErrorCategory::Timeout);
    }

    #[test]
    fn test_connect_flag_is_connection_refused() {
        let failure = FailureDescriptor {
            connect_failed: true,
            ..FailureDescriptor::default()
        };
        assert_eq!(classify(&failure).category, ErrorCategory::ConnectionRefused);
    }

    #[test]
    fn test_connection_markers_are_case_insensitive() {
        for message in [
            "TypeError: Failed to fetch",
            "tcp connect error: Connection refused (os error 111)",
            "Network is unreachable",
            "dns error: failed to lookup address information",
            "net::ERR_NAME_NOT_RESOLVED",
        ] {
            let classified = classify(&FailureDescriptor::message(message));
            assert_eq!(
                classified.category,
                ErrorCategory::ConnectionRefused,
                "{message}"
            );
        }
    }

    #[test]
    fn test_marker_takes_priority_over_status() {
        let failure = FailureDescriptor::http_status(502, "upstream connection refused");
        assert_eq!(classify(&failure).category, ErrorCategory::ConnectionRefused);
    }

    #[test]
    fn test_server_and_client_statuses() {
        assert_eq!(
            classify(&FailureDescriptor::http_status(500, "boom")).category,
            ErrorCategory::ServerError
        );
        assert_eq!(
            classify(&FailureDescriptor::http_status(599, "")).category,
            ErrorCategory::ServerError
        );
        assert_eq!(
            classify(&FailureDescriptor::http_status(400, "")).category,
            ErrorCategory::ClientError
        );
        assert_eq!(
            classify(&FailureDescriptor::http_status(404, "city not found")).category,
            ErrorCategory::ClientError
        );
        assert_eq!(
            classify(&FailureDescriptor::http_status(499, "")).category,
            ErrorCategory::ClientError
        );
    }

    #[test]
    fn test_everything_else_is_unknown() {
        assert_eq!(
            classify(&FailureDescriptor::message("invalid json")).category,
            ErrorCategory::Unknown
        );
        assert_eq!(
            classify(&FailureDescriptor::http_status(302, "")).category,
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn test_classification_keeps_status_and_message() {
        let classified = classify(&FailureDescriptor::http_status(401, "Invalid API key"));
        assert_eq!(classified.http_status, Some(401));
        assert_eq!(classified.message, "Invalid API key");
        assert!(!classified.is_connectivity_failure());
    }

    #[test]
    fn test_only_timeout_and_refused_are_connectivity() {
        assert!(ErrorCategory::Timeout.is_connectivity());
        assert!(ErrorCategory::ConnectionRefused.is_connectivity());
        assert!(!ErrorCategory::ServerError.is_connectivity());
        assert!(!ErrorCategory::ClientError.is_connectivity());
        assert!(!ErrorCategory::Unknown.is_connectivity());
    }

    #[test]
    fn test_user_messages_depend_on_status() {
        let not_found = ClassifiedError::new(ErrorCategory::ClientError, "").with_status(404);
        assert!(not_found.user_message().contains("Not found"));
        let timeout = ClassifiedError::new(ErrorCategory::Timeout, "");
        assert!(timeout.user_message().contains("timed out"));
    }
}
