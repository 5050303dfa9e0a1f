//! Centralized error types for the AgroDash layer.
//!
//! This module provides a typed error hierarchy that:
//! - Keeps the classification of a failure attached to it
//! - Provides user-friendly messages suitable for UI display
//! - Preserves full error context for debugging/logging

use thiserror::Error;

use crate::classify::ClassifiedError;

/// Top-level error type.
///
/// Use `user_message()` to get a UI-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Request failed: {0}")]
    Request(#[from] ClassifiedError),

    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A result arrived after a newer request replaced it.
    #[error("Request superseded by a newer one")]
    Superseded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display in the UI.
    ///
    /// These messages are designed to be actionable and non-technical.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Request(e) => e.user_message(),
            AppError::Location(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Superseded => "Refreshing…",
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Location service errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable")]
    ServiceUnavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location request superseded by a newer one")]
    Superseded,
}

impl LocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::PermissionDenied => {
                "Location access was denied. Enter a city instead."
            }
            LocationError::ServiceUnavailable => {
                "Your location is unavailable. Enter a city instead."
            }
            LocationError::Timeout => "Finding your location took too long. Please try again.",
            LocationError::Superseded => "Refreshing…",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorCategory;

    #[test]
    fn test_user_messages_are_non_empty() {
        let errors = vec![
            AppError::Request(ClassifiedError::new(ErrorCategory::Timeout, "t")),
            AppError::Location(LocationError::PermissionDenied),
            AppError::Config(ConfigError::Invalid("test".into())),
            AppError::Superseded,
            AppError::Other(anyhow::anyhow!("x")),
        ];

        for err in errors {
            assert!(!err.user_message().is_empty(), "{err}");
        }
    }

    #[test]
    fn test_app_error_conversion() {
        let loc_err = LocationError::Timeout;
        let app_err: AppError = loc_err.into();
        assert!(matches!(app_err, AppError::Location(LocationError::Timeout)));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::from(ClassifiedError::new(
            ErrorCategory::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(
            app_err.user_message(),
            "Unable to connect. Check your internet connection."
        );
    }
}
