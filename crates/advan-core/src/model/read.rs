// ── Tag observations ──

use serde::{Deserialize, Serialize};

use advan_api::InventoryItem;

/// One tag seen by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Read {
    /// Upper-case hex EPC.
    pub epc: String,
    /// Received signal strength, dBm.
    pub rssi: Option<f64>,
    /// Antenna port the tag was seen on.
    pub antenna_id: Option<u32>,
}

impl Read {
    pub fn new(epc: &str) -> Self {
        Self {
            epc: normalize_epc(epc),
            rssi: None,
            antenna_id: None,
        }
    }
}

impl From<InventoryItem> for Read {
    fn from(item: InventoryItem) -> Self {
        Self {
            epc: normalize_epc(&item.epc),
            rssi: item.rssi,
            antenna_id: item.antenna,
        }
    }
}

/// Canonical EPC form: trimmed, upper-case hex.
pub fn normalize_epc(epc: &str) -> String {
    epc.trim().to_ascii_uppercase()
}
