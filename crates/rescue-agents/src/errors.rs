//! Collaborator error taxonomy.
//!
//! Every failure a collaborator (speech, validator, assistant, probes,
//! intake) can report is represented here. The orchestrator never matches on
//! strings: it asks `class()` how to treat the error.
//!
//! ## Classes
//!
//! | Class          | Meaning                                   | Handling                        |
//! |----------------|-------------------------------------------|---------------------------------|
//! | Capability     | Device feature missing (no microphone)    | Downgrade to the fallback path  |
//! | Transient      | Network, timeout, malformed response      | Failure edge of the state       |
//! | Rejected       | Remote answered with a non-success status | Failure edge of the state       |
//! | Configuration  | Missing endpoint, bad credentials         | Failure edge, logged as error   |
//! | Cancelled      | Scope torn down                           | Dropped silently                |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// How the orchestrator treats a collaborator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Capability,
    Transient,
    Rejected,
    Configuration,
    Cancelled,
}

impl ErrorClass {
    /// Whether the failure should reach the state machine at all.
    pub fn is_reportable(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capability => write!(f, "capability"),
            Self::Transient => write!(f, "transient"),
            Self::Rejected => write!(f, "rejected"),
            Self::Configuration => write!(f, "configuration"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Unified error type for all collaborator calls.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The device lacks the capability (e.g. speech recognition).
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    /// Connection refused, DNS failure, reset.
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Remote answered with a non-success status.
    #[error("Rejected by {service} (status {status}): {message}")]
    Rejected {
        service: String,
        status: u16,
        message: String,
    },

    /// Remote answered 2xx with a body we could not use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CollaboratorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unavailable(_) => ErrorClass::Capability,
            Self::Network(_) | Self::Timeout(_) | Self::InvalidResponse(_) | Self::Internal(_) => {
                ErrorClass::Transient
            }
            Self::Rejected { .. } => ErrorClass::Rejected,
            Self::Configuration(_) => ErrorClass::Configuration,
            Self::Cancelled(_) => ErrorClass::Cancelled,
        }
    }

    /// Build a `Rejected` variant conveniently.
    pub fn rejected(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
