// Event-stream message decoding.
//
// Each frame payload is one XML document. The root element decides what it
// is; everything is decoded once into `DeviceMessage` so consumers match on
// an enum instead of comparing element names.

use std::str::FromStr;

use roxmltree::Node;
use strum::EnumString;
use tracing::debug;

use crate::error::Error;
use crate::xml;

/// Root elements the stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
enum RootKind {
    #[strum(serialize = "inventory")]
    Inventory,
    #[strum(serialize = "deviceEventMessage")]
    DeviceEvent,
}

/// One tag observation inside an inventory batch.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryItem {
    /// Device timestamp of the observation.
    pub timestamp: i64,
    /// Hex EPC exactly as reported (not yet normalised).
    pub epc: String,
    pub rssi: Option<f64>,
    pub antenna: Option<u32>,
}

/// A decoded event-stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    /// A batch of tag observations, in device order.
    Inventory(Vec<InventoryItem>),
    /// A digital-input line changed level.
    Gpi { line: u32, low_to_high: bool },
}

/// Decode one payload.
///
/// Returns `Ok(None)` for well-formed documents that are not of interest:
/// unknown root elements and device events other than `GPI`.
pub fn decode(payload: &str) -> Result<Option<DeviceMessage>, Error> {
    let doc = xml::parse(payload)?;
    let root = doc.root_element();

    let Ok(kind) = RootKind::from_str(root.tag_name().name()) else {
        debug!(root = root.tag_name().name(), "ignoring unknown message root");
        return Ok(None);
    };

    match kind {
        RootKind::Inventory => Ok(Some(DeviceMessage::Inventory(decode_inventory(root)))),
        RootKind::DeviceEvent => Ok(decode_event(root)),
    }
}

/// `<inventory><data><inventory><items><item>...`
fn decode_inventory(root: Node<'_, '_>) -> Vec<InventoryItem> {
    let Some(items) = xml::descendant(root, "data")
        .and_then(|data| xml::descendant(data, "inventory"))
        .and_then(|inv| xml::descendant(inv, "items"))
    else {
        return Vec::new();
    };

    xml::children_named(items, "item")
        .filter_map(|item| {
            let decoded = decode_item(item);
            if decoded.is_none() {
                debug!("skipping inventory item without ts/hexepc");
            }
            decoded
        })
        .collect()
}

fn decode_item(item: Node<'_, '_>) -> Option<InventoryItem> {
    let timestamp = xml::descendant_text(item, "ts")?.parse().ok()?;
    let data = xml::descendant(item, "data")?;
    let epc = xml::descendant_text(data, "hexepc")?.to_owned();

    let mut rssi = None;
    let mut antenna = None;
    if let Some(props) = xml::descendant(data, "props") {
        for prop in xml::children_named(props, "prop") {
            let Some(text) = prop.text() else { continue };
            if text.contains("RSSI") {
                rssi = property_value(text).and_then(|v| v.parse().ok());
            } else if text.contains("ANTENNA_PORT") {
                antenna = property_value(text).and_then(|v| v.parse().ok());
            }
        }
    }

    Some(InventoryItem {
        timestamp,
        epc,
        rssi,
        antenna,
    })
}

/// Value part of a `NAME:value[,more]` property string.
fn property_value(text: &str) -> Option<&str> {
    let (_, rest) = text.split_once(':')?;
    let value = rest.split(',').next().unwrap_or(rest);
    Some(value.trim())
}

/// `<deviceEventMessage><event><type>GPI</type><line>1</line><lowToHigh>true</lowToHigh>`
fn decode_event(root: Node<'_, '_>) -> Option<DeviceMessage> {
    let event = xml::descendant(root, "event")?;
    match xml::descendant_text(event, "type")? {
        "GPI" => {
            let line = xml::descendant_text(event, "line")?.parse().ok()?;
            let low_to_high = xml::descendant_text(event, "lowToHigh")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            Some(DeviceMessage::Gpi { line, low_to_high })
        }
        other => {
            debug!(event_type = other, "ignoring device event");
            None
        }
    }
}
