//! Tagged error taxonomy shared by every subsystem.
//!
//! The server reports errors by name (`error` field on a `processingError`
//! packet) rather than by exception hierarchy; this enum mirrors that
//! tagging so callers can match on a specific kind instead of parsing
//! message strings. Only [`SdkError::retryable`] encodes which kinds
//! [`crate::http::HttpClient`] is allowed to retry on its own — the
//! transport layer never retries application-level requests itself.

use std::time::SystemTime;

use thiserror::Error;

/// A server- or client-detected failure, tagged by kind.
#[derive(Debug, Error, Clone)]
pub enum SdkError {
    /// Malformed request; the server will not accept it no matter how many
    /// times it is retried.
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable description.
        message: String,
        /// Field-level detail, when the server supplies it.
        details: Option<String>,
    },

    /// The referenced resource (order, position, history record) does not
    /// exist.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description.
        message: String,
    },

    /// The operation requires a synchronization state that has not been
    /// reached yet.
    #[error("not synchronized: {message}")]
    NotSynchronized {
        /// Human-readable description.
        message: String,
    },

    /// The server reports the session is not authenticated.
    #[error("not connected: {message}")]
    NotConnected {
        /// Human-readable description.
        message: String,
    },

    /// The auth token was rejected. Fatal: the transport tears down the
    /// socket in addition to surfacing this to the caller.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Human-readable description.
        message: String,
    },

    /// Generic upstream/network failure. Retried by `HttpClient`.
    #[error("api error {code}: {message}")]
    Api {
        /// Server-supplied error code.
        code: String,
        /// Human-readable description.
        message: String,
    },

    /// Transient server-side failure. Retried by `HttpClient`.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable description.
        message: String,
    },

    /// Rate limited; carries the wall-clock time the server recommends
    /// waiting until before retrying.
    #[error("too many requests: {message}")]
    TooManyRequests {
        /// Human-readable description.
        message: String,
        /// Wall-clock time the server recommends waiting until.
        recommended_retry_time: SystemTime,
    },

    /// A local bounded wait exceeded its timeout. Never retried
    /// automatically.
    #[error("timeout: {message}")]
    Timeout {
        /// Human-readable description.
        message: String,
    },

    /// A trade command was rejected by the server, carrying its result
    /// code.
    #[error("trade error {code} ({string_code}): {message}")]
    Trade {
        /// Numeric result code from the trading server.
        code: i32,
        /// String result code from the trading server.
        string_code: String,
        /// Human-readable description.
        message: String,
    },
}

impl SdkError {
    /// Build a [`SdkError`] from a server-reported error name and message,
    /// as carried on a `processingError` packet (§7).
    #[must_use]
    pub fn from_server(name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match name {
            "ValidationError" => Self::Validation {
                message,
                details: None,
            },
            "NotFoundError" => Self::NotFound { message },
            "NotSynchronizedError" => Self::NotSynchronized { message },
            "NotConnectedError" => Self::NotConnected { message },
            "UnauthorizedError" => Self::Unauthorized { message },
            "InternalError" => Self::Internal { message },
            _ => Self::Api {
                code: name.to_string(),
                message,
            },
        }
    }

    /// Whether `HttpClient` is permitted to retry a call that failed with
    /// this error, per the §4.2 / §7 taxonomy. `TooManyRequests` is handled
    /// by its own wall-clock wait path and is deliberately excluded here.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Internal { .. })
    }

    /// Whether this error is fatal to the transport connection as a whole
    /// (as opposed to just the one request that triggered it).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_server_maps_known_names() {
        assert!(matches!(
            SdkError::from_server("ValidationError", "bad field"),
            SdkError::Validation { .. }
        ));
        assert!(matches!(
            SdkError::from_server("NotFoundError", "no such order"),
            SdkError::NotFound { .. }
        ));
        assert!(matches!(
            SdkError::from_server("UnauthorizedError", "bad token"),
            SdkError::Unauthorized { .. }
        ));
    }

    #[test]
    fn from_server_falls_back_to_api_error() {
        let err = SdkError::from_server("SomeUpstreamGlitch", "weird");
        match err {
            SdkError::Api { code, message } => {
                assert_eq!(code, "SomeUpstreamGlitch");
                assert_eq!(message, "weird");
            }
            other => panic!("expected Api variant, got {other:?}"),
        }
    }

    #[test]
    fn retryable_kinds() {
        assert!(
            SdkError::Api {
                code: "E".into(),
                message: "m".into()
            }
            .retryable()
        );
        assert!(
            SdkError::Internal {
                message: "m".into()
            }
            .retryable()
        );
        assert!(
            !SdkError::Validation {
                message: "m".into(),
                details: None
            }
            .retryable()
        );
        assert!(
            !SdkError::TooManyRequests {
                message: "m".into(),
                recommended_retry_time: SystemTime::now(),
            }
            .retryable()
        );
    }

    #[test]
    fn unauthorized_is_fatal() {
        assert!(
            SdkError::Unauthorized {
                message: "bad token".into()
            }
            .is_fatal()
        );
        assert!(
            !SdkError::NotFound {
                message: "x".into()
            }
            .is_fatal()
        );
    }
}
