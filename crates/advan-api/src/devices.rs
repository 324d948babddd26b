// Device-level endpoints: discovery, modes, start/stop, GPIO, parameters,
// antenna configuration.

use std::collections::BTreeMap;

use tracing::debug;

use crate::control::ControlClient;
use crate::error::Error;
use crate::models::Device;
use crate::xml::{self, Element};

const RESULT_PATH: &[&str] = &["response", "data", "result"];

/// Antenna definition fields after the id: mux1, mux2, direction, then the
/// location name and its x/y/z.
const ANTENNA_MUX: &str = "0,0,-1";
const ANTENNA_LOCATION_XYZ: &str = "0,0,0";

impl ControlClient {
    // ── Discovery ────────────────────────────────────────────────────

    /// `GET /devices`. `host` is recorded on each returned device.
    pub async fn list_devices(&self, host: &str) -> Result<Vec<Device>, Error> {
        let body = self.get(self.url("devices")?).await?;
        let doc = xml::parse(&body)?;

        let protocol_version = xml::texts(&doc, &["response", "msg-version"])
            .pop()
            .unwrap_or_default();

        let devices = xml::select(&doc, &["response", "data", "devices", "device"])
            .into_iter()
            .filter_map(|node| {
                let field = |name: &str| {
                    xml::children_named(node, name)
                        .find_map(|n| n.text())
                        .map(str::to_owned)
                };
                Some(Device {
                    id: field("id")?,
                    serial: field("serial").unwrap_or_default(),
                    family: field("family").unwrap_or_default(),
                    host: host.to_owned(),
                    protocol_version: protocol_version.clone(),
                })
            })
            .collect::<Vec<_>>();

        debug!(count = devices.len(), %protocol_version, "listed devices");
        Ok(devices)
    }

    // ── Modes ────────────────────────────────────────────────────────

    /// Read-mode names the device supports.
    pub async fn device_modes(&self, device_id: &str) -> Result<Vec<String>, Error> {
        let body = self.get(self.device_url(device_id, "deviceModes")?).await?;
        let doc = xml::parse(&body)?;
        Ok(xml::texts(
            &doc,
            &["response", "data", "entries", "entry", "readModes", "readMode", "name"],
        ))
    }

    pub async fn active_read_mode(&self, device_id: &str) -> Result<String, Error> {
        let body = self.get(self.device_url(device_id, "activeReadMode")?).await?;
        result_text(&body)?.ok_or(Error::MissingField {
            field: "data/result",
        })
    }

    pub async fn set_active_device_mode(&self, device_id: &str, mode: &str) -> Result<(), Error> {
        self.put_text(self.device_url(device_id, "activeDeviceMode")?, mode)
            .await?;
        Ok(())
    }

    // ── RF control ───────────────────────────────────────────────────

    /// Start RF emission. Returns the device's `ts`, if the response has one.
    pub async fn start(&self, device_id: &str) -> Result<Option<i64>, Error> {
        let body = self.get(self.device_url(device_id, "start")?).await?;
        let doc = xml::parse(&body)?;
        Ok(xml::first_text(&doc, &["response", "ts"]).and_then(|ts| ts.trim().parse().ok()))
    }

    pub async fn stop(&self, device_id: &str) -> Result<(), Error> {
        self.get(self.device_url(device_id, "stop")?).await?;
        Ok(())
    }

    /// Persist the running configuration on the device.
    pub async fn save_configuration(&self, device_id: &str) -> Result<(), Error> {
        self.get(self.device_url(device_id, "confSave")?).await?;
        Ok(())
    }

    // ── GPIO ─────────────────────────────────────────────────────────

    pub async fn gpi(&self, device_id: &str, line: u32) -> Result<bool, Error> {
        let body = self
            .get(self.device_url(device_id, &format!("getGPI/{line}"))?)
            .await?;
        Ok(result_text(&body)?.is_some_and(|v| parse_bool(&v)))
    }

    /// State of every input, keyed by line index.
    pub async fn gpi_all(&self, device_id: &str) -> Result<BTreeMap<u32, bool>, Error> {
        let body = self.get(self.device_url(device_id, "getGPIAll")?).await?;
        let doc = xml::parse(&body)?;

        let states = xml::select(&doc, &["response", "data", "entries", "entry"])
            .into_iter()
            .filter_map(|entry| {
                let index = xml::descendant_text(entry, "index")?.parse().ok()?;
                let state = xml::descendant_text(entry, "result").is_some_and(parse_bool);
                Some((index, state))
            })
            .collect();
        Ok(states)
    }

    pub async fn set_gpo(&self, device_id: &str, line: u32, state: bool) -> Result<(), Error> {
        self.get(self.device_url(device_id, &format!("setGPO/{line}/{state}"))?)
            .await?;
        Ok(())
    }

    // ── Parameters ───────────────────────────────────────────────────

    pub async fn get_parameter(&self, device_id: &str, name: &str) -> Result<Option<String>, Error> {
        let body = self
            .get(self.device_url(device_id, &format!("reader/parameter/{name}"))?)
            .await?;
        result_text(&body)
    }

    pub async fn set_parameter(&self, device_id: &str, name: &str, value: &str) -> Result<(), Error> {
        self.put_text(
            self.device_url(device_id, &format!("reader/parameter/{name}"))?,
            value,
        )
        .await?;
        Ok(())
    }

    /// RF power used for tag writes, in dBm.
    pub async fn set_write_power(&self, device_id: &str, power: f64) -> Result<(), Error> {
        let path = format!("reader/parameter/RF_WRITE_POWER/{}", format_decimal(power));
        self.get(self.device_url(device_id, &path)?).await?;
        Ok(())
    }

    // ── Antennas ─────────────────────────────────────────────────────

    /// Replace the antenna configuration.
    ///
    /// The three slices are parallel; mismatched lengths are rejected before
    /// any request is made. A power or sensitivity of `0.0` leaves that
    /// setting at the device default.
    pub async fn configure_antennas(
        &self,
        device_id: &str,
        antennas: &[u32],
        tx_power: &[f64],
        rx_sensitivity: &[f64],
    ) -> Result<(), Error> {
        let body = antenna_request(device_id, antennas, tx_power, rx_sensitivity)?;
        self.put(self.device_url(device_id, "antennas")?, Some(body))
            .await?;
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn result_text(body: &str) -> Result<Option<String>, Error> {
    let doc = xml::parse(body)?;
    Ok(xml::first_text(&doc, RESULT_PATH).map(|s| s.trim().to_owned()))
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Decimal rendering that always keeps a fractional part (`30` → `30.0`).
pub(crate) fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

pub(crate) fn antenna_request(
    device_id: &str,
    antennas: &[u32],
    tx_power: &[f64],
    rx_sensitivity: &[f64],
) -> Result<String, Error> {
    if antennas.len() != tx_power.len() || antennas.len() != rx_sensitivity.len() {
        return Err(Error::Configuration {
            message: format!(
                "antenna arrays differ in length: antennas={}, tx_power={}, rx_sensitivity={}",
                antennas.len(),
                tx_power.len(),
                rx_sensitivity.len()
            ),
        });
    }

    let mut entries = Element::new("entries");
    for ((&antenna, &power), &sensitivity) in antennas.iter().zip(tx_power).zip(rx_sensitivity) {
        entries.push(antenna_entry(device_id, antenna, power, sensitivity));
    }
    Ok(Element::new("request").child(entries).render())
}

fn antenna_entry(device_id: &str, antenna: u32, power: f64, sensitivity: f64) -> Element {
    let setting = |v: f64| if v == 0.0 { String::new() } else { format_decimal(v) };

    Element::new("entry")
        .child(Element::text("class", "ANTENNA_DEFINITION"))
        .child(Element::text(
            "def",
            format!("{device_id},{antenna},{ANTENNA_MUX},antenna_{antenna},{ANTENNA_LOCATION_XYZ}"),
        ))
        .child(
            Element::new("conf")
                .child(Element::text("class", "ANTENNA_CONF"))
                .child(Element::text("power", setting(power)))
                .child(Element::text("sensitivity", setting(sensitivity)))
                .child(Element::new("readTime")),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn antenna_request_shape() {
        let xml = antenna_request("AdvanReader-m4", &[1], &[30.0], &[0.0]).unwrap();
        assert_eq!(
            xml,
            "<request><entries><entry><class>ANTENNA_DEFINITION</class>\
             <def>AdvanReader-m4,1,0,0,-1,antenna_1,0,0,0</def>\
             <conf><class>ANTENNA_CONF</class><power>30.0</power>\
             <sensitivity/><readTime/></conf></entry></entries></request>"
        );
    }

    #[test]
    fn antenna_request_rejects_mismatched_arrays() {
        let err = antenna_request("d", &[1, 2], &[10.0], &[-70.0, -70.0]).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn decimals_keep_a_fraction() {
        assert_eq!(format_decimal(30.0), "30.0");
        assert_eq!(format_decimal(-72.5), "-72.5");
    }
}
