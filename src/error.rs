// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error taxonomy shared by the fetchers, the reconciler and the governor.
//!
//! Every remote failure is classified into one of four kinds. The kind decides
//! what happens next: refresh the token, wait out the quota, back off and retry,
//! or give up on the activity.

use serde::Serialize;
use std::time::Duration;

/// Failure returned by a remote service call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// Wait advertised by the service, when it told us one.
        retry_after: Option<Duration>,
    },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// The kind of a [`SyncError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthExpired,
    RateLimited,
    Transient,
    Fatal,
}

impl SyncError {
    /// Convenience constructor for a rate limit with no advertised reset.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        SyncError::RateLimited {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::AuthExpired(_) => ErrorKind::AuthExpired,
            SyncError::RateLimited { .. } => ErrorKind::RateLimited,
            SyncError::Transient(_) => ErrorKind::Transient,
            SyncError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the governor may retry this error after a wait.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RateLimited { .. } | SyncError::Transient(_)
        )
    }

    /// Classify a transport-level reqwest failure (no HTTP status available).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            return SyncError::Fatal(format!("Malformed response: {}", err));
        }
        if let Some(status) = err.status() {
            return SyncError::from_status(status.as_u16(), err.to_string(), None);
        }
        // Connect, timeout, body and redirect failures are worth another try.
        SyncError::Transient(err.to_string())
    }

    /// Classify an HTTP error status.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => SyncError::AuthExpired(format!("HTTP {}: {}", status, body)),
            429 => SyncError::RateLimited {
                message: format!("HTTP {}: {}", status, body),
                retry_after,
            },
            408 | 500..=599 => SyncError::Transient(format!("HTTP {}: {}", status, body)),
            _ => SyncError::Fatal(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::AuthExpired => "auth_expired",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Result type alias for remote calls
pub type Result<T> = std::result::Result<T, SyncError>;
