use thiserror::Error;

/// Framing failures on the inventory event stream.
///
/// Every variant is connection-fatal: once the byte stream can no longer be
/// trusted to sit on a frame boundary, the stream worker tears down and
/// reports the connection as lost.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A header line did not have the expected `Name:value` shape.
    #[error("Malformed frame header: {line:?}")]
    MalformedHeader { line: String },

    /// The frame announced a body type other than `text/xml`.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The connection closed before the header block was complete.
    #[error("Connection closed inside frame header")]
    IncompleteHeader,

    /// The connection closed in the middle of a frame body.
    #[error("Truncated frame: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    /// The announced body exceeds the configured limit.
    #[error("Frame payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The body bytes were not valid UTF-8.
    #[error("Frame body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Socket read failure.
    #[error("Stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type for the `advan-api` crate.
///
/// Covers every failure mode across both device channels: the HTTP control
/// plane, the framed event stream, and XML decoding. `advan-core` maps these
/// into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-success HTTP status without a device error marker in the body.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The event-stream socket could not be opened.
    #[error("Cannot connect to event stream at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Device ──────────────────────────────────────────────────────
    /// The device answered with the `ERROR` marker.
    #[error("Device error: {message}")]
    Device { message: String },

    /// Arguments rejected before anything was sent to the device.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Stream ──────────────────────────────────────────────────────
    /// Event-stream framing failure.
    #[error(transparent)]
    Framing(#[from] FrameError),

    // ── Data ────────────────────────────────────────────────────────
    /// A response or event body was not well-formed XML.
    #[error("XML error: {message}")]
    Xml { message: String, body: String },

    /// A well-formed response lacked an element the call needs.
    #[error("Response is missing `{field}`")]
    MissingField { field: &'static str },
}

impl Error {
    /// Returns `true` if the device itself rejected the request.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Connect { .. } => true,
            _ => false,
        }
    }

    /// The device-reported message, if this is a device error.
    pub fn device_message(&self) -> Option<&str> {
        match self {
            Self::Device { message } => Some(message),
            _ => None,
        }
    }
}
