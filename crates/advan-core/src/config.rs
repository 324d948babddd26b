// ── Runtime reader configuration ──
//
// These types describe *how* to drive one reader: where it lives, how its
// antennas are tuned and which Gen2 air settings to apply. They never touch
// disk; `advan-config` or the caller builds a `ReaderSettings` and hands it
// to `Reader`.

use std::time::Duration;

use advan_api::ops::{DEFAULT_TAG_OP_TIMEOUT_MS, DEFAULT_WRITE_RETRIES};
use advan_api::stream::DEFAULT_EVENT_PORT;
use advan_api::transport::DEFAULT_REQUEST_TIMEOUT;
use advan_api::{Gen2Session, Gen2Target, TagOpParams, TransportConfig};

use crate::error::CoreError;

/// Default HTTP control port.
pub const DEFAULT_CONTROL_PORT: u16 = 3161;

/// Configuration for one reader session.
///
/// `antennas`, `tx_power` and `rx_sensitivity` are parallel arrays: entry
/// `i` of each describes the same antenna port. A power or sensitivity of
/// `0.0` leaves the device default in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderSettings {
    pub host: String,
    /// HTTP control port.
    pub port: u16,
    /// TCP port of the inventory event stream.
    pub event_port: u16,
    pub antennas: Vec<u32>,
    /// Transmit power per antenna, dBm.
    pub tx_power: Vec<f64>,
    /// Receive sensitivity per antenna, dBm.
    pub rx_sensitivity: Vec<f64>,
    /// RF power used for tag writes, dBm.
    pub write_power: f64,
    /// Gen2 session index, `0..=3` → `S0..S3`.
    pub session: u8,
    /// Gen2 search target index, `0..=3` → `A`, `B`, `AB`, `BA`.
    pub search_mode_index: u8,
    /// Bound on each control request.
    pub request_timeout: Duration,
    /// Air timeout for each tag operation, milliseconds.
    pub tag_op_timeout_ms: u64,
    pub write_retries: u32,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_CONTROL_PORT,
            event_port: DEFAULT_EVENT_PORT,
            antennas: vec![1],
            tx_power: vec![0.0],
            rx_sensitivity: vec![0.0],
            write_power: 30.0,
            session: 1,
            search_mode_index: 2,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            tag_op_timeout_ms: DEFAULT_TAG_OP_TIMEOUT_MS,
            write_retries: DEFAULT_WRITE_RETRIES,
        }
    }
}

impl ReaderSettings {
    /// Settings for `host` with every other field at its default.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Check everything that can be checked without talking to the device.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.host.trim().is_empty() {
            return Err(CoreError::Configuration {
                message: "host must not be empty".into(),
            });
        }
        if self.antennas.len() != self.tx_power.len()
            || self.antennas.len() != self.rx_sensitivity.len()
        {
            return Err(CoreError::Configuration {
                message: format!(
                    "antennas ({}), tx_power ({}) and rx_sensitivity ({}) must have equal length",
                    self.antennas.len(),
                    self.tx_power.len(),
                    self.rx_sensitivity.len()
                ),
            });
        }
        self.gen2_session()?;
        self.gen2_target()?;
        Ok(())
    }

    pub fn gen2_session(&self) -> Result<Gen2Session, CoreError> {
        Gen2Session::from_index(self.session).ok_or_else(|| CoreError::Configuration {
            message: format!("session index {} is out of range 0..=3", self.session),
        })
    }

    pub fn gen2_target(&self) -> Result<Gen2Target, CoreError> {
        Gen2Target::from_index(self.search_mode_index).ok_or_else(|| CoreError::Configuration {
            message: format!(
                "search mode index {} is out of range 0..=3",
                self.search_mode_index
            ),
        })
    }

    pub fn tag_op_params(&self) -> TagOpParams {
        TagOpParams {
            timeout_ms: self.tag_op_timeout_ms,
            write_retries: self.write_retries,
            antenna: None,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig::with_timeout(self.request_timeout)
    }
}
