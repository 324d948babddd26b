// ── Core error types ──
//
// User-facing errors from advan-core. Consumers never see HTTP status codes
// or XML parse failures directly; the `From<advan_api::Error>` impl
// translates wire-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to reader at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Reader is not connected")]
    NotConnected,

    #[error("Reader request timed out")]
    Timeout,

    // ── Stream errors ────────────────────────────────────────────────
    #[error("Event stream framing error: {message}")]
    Framing { message: String },

    // ── Device errors ────────────────────────────────────────────────
    /// The reader answered with its error marker.
    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Arguments rejected locally, nothing was sent or queued.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The device-reported message, if the reader rejected the request.
    pub fn device_message(&self) -> Option<&str> {
        match self {
            Self::Device { message } => Some(message),
            _ => None,
        }
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<advan_api::Error> for CoreError {
    fn from(err: advan_api::Error) -> Self {
        match err {
            advan_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        address: e
                            .url()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            advan_api::Error::InvalidUrl(e) => CoreError::Configuration {
                message: format!("Invalid URL: {e}"),
            },
            advan_api::Error::Http { status, body } => CoreError::Api {
                message: body,
                status: Some(status),
            },
            advan_api::Error::Connect { addr, source } => CoreError::ConnectionFailed {
                address: addr,
                reason: source.to_string(),
            },
            advan_api::Error::Device { message } => CoreError::Device { message },
            advan_api::Error::Configuration { message } => CoreError::Configuration { message },
            advan_api::Error::Framing(e) => CoreError::Framing {
                message: e.to_string(),
            },
            advan_api::Error::Xml { message, body: _ } => {
                CoreError::Internal(format!("Malformed reader response: {message}"))
            }
            advan_api::Error::MissingField { field } => {
                CoreError::Internal(format!("Reader response is missing `{field}`"))
            }
        }
    }
}
