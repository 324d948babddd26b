// Shared transport configuration for building reqwest::Client instances.
//
// The control client and any ad-hoc callers share timeout and user-agent
// settings through this module instead of duplicating builder logic.

use std::time::Duration;

/// Default bound on a single control-plane request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout (connect + send + body).
    pub timeout: Duration,
    /// Connect-phase timeout. `None` leaves it to `timeout`.
    pub connect_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: None,
        }
    }
}

impl TransportConfig {
    /// Config with the given request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("advan-rs/", env!("CARGO_PKG_VERSION")));

        if let Some(connect) = self.connect_timeout {
            builder = builder.connect_timeout(connect);
        }

        builder.build().map_err(crate::error::Error::Transport)
    }
}
