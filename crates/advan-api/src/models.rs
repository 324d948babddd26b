// Wire-level types for the reader's control API
//
// Shapes the device reports (device identity) and the enumerations that
// appear verbatim in request documents (memory banks, lock actions, Gen2
// session/target names).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ── Device ───────────────────────────────────────────────────────────

/// A reader as reported by `GET /devices`.
///
/// Immutable once discovered; a session holds on to the first device the
/// host reports for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device identifier used as the root of every control path.
    pub id: String,
    pub serial: String,
    /// Hardware family / model name.
    pub family: String,
    /// Host the device was discovered on.
    pub host: String,
    /// Value of the response's `msg-version` element.
    pub protocol_version: String,
}

/// Name of the autonomous read mode in `deviceModes` / `activeReadMode`.
pub const AUTONOMOUS_READ_MODE: &str = "AUTONOMOUS";

/// Body sent to `activeDeviceMode` to switch into autonomous streaming.
pub const AUTONOMOUS_DEVICE_MODE: &str = "Autonomous";

// ── Memory banks ─────────────────────────────────────────────────────

/// Gen2 tag memory bank. The discriminant is the bank number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryBank {
    Reserved = 0,
    Epc = 1,
    Tid = 2,
    User = 3,
}

impl MemoryBank {
    /// Look up a bank by its Gen2 number.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Reserved),
            1 => Some(Self::Epc),
            2 => Some(Self::Tid),
            3 => Some(Self::User),
            _ => None,
        }
    }
}

// ── Locking ──────────────────────────────────────────────────────────

/// Action applied to one lockable memory area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockAction {
    /// Write lock.
    Lock,
    /// Permanent write lock.
    PermaLock,
    /// Permanent write unlock.
    PermaUnlock,
    /// Write unlock.
    Unlock,
    /// Leave the area as it is.
    #[default]
    None,
}

impl LockAction {
    fn keyword(self) -> Option<&'static str> {
        match self {
            Self::Lock => Some("LOCK"),
            Self::PermaLock => Some("PERMALOCK"),
            Self::PermaUnlock => Some("PERMAUNLOCK"),
            Self::Unlock => Some("UNLOCK"),
            Self::None => None,
        }
    }
}

/// Per-area lock actions for a Gen2 lock command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockOptions {
    pub epc: LockAction,
    pub tid: LockAction,
    pub user: LockAction,
    pub access_password: LockAction,
    pub kill_password: LockAction,
}

impl LockOptions {
    pub const UNLOCK_EPC: Self = Self::new(
        LockAction::Unlock,
        LockAction::None,
        LockAction::None,
        LockAction::None,
        LockAction::None,
    );
    pub const UNLOCK_ALL: Self = Self::new(
        LockAction::Unlock,
        LockAction::None,
        LockAction::Unlock,
        LockAction::Unlock,
        LockAction::None,
    );
    pub const LOCK_ALL: Self = Self::new(
        LockAction::Lock,
        LockAction::None,
        LockAction::Lock,
        LockAction::Lock,
        LockAction::None,
    );
    pub const LOCK_USER: Self = Self::new(
        LockAction::None,
        LockAction::None,
        LockAction::Lock,
        LockAction::None,
        LockAction::None,
    );

    pub const fn new(
        epc: LockAction,
        tid: LockAction,
        user: LockAction,
        access_password: LockAction,
        kill_password: LockAction,
    ) -> Self {
        Self {
            epc,
            tid,
            user,
            access_password,
            kill_password,
        }
    }

    /// The `locks` string the device expects, e.g. `ACCESS_LOCKEPC_LOCK`.
    ///
    /// Areas are emitted in access, kill, epc, tid, user order; areas with
    /// [`LockAction::None`] are omitted.
    pub fn to_locks_string(&self) -> String {
        [
            ("ACCESS_", self.access_password),
            ("KILL_", self.kill_password),
            ("EPC_", self.epc),
            ("TID_", self.tid),
            ("USER_", self.user),
        ]
        .into_iter()
        .filter_map(|(prefix, action)| action.keyword().map(|k| format!("{prefix}{k}")))
        .collect()
    }
}

// ── Gen2 air-interface settings ──────────────────────────────────────

/// Gen2 inventory session, written to the `GEN2_SESSION` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Gen2Session {
    S0,
    S1,
    S2,
    S3,
}

impl Gen2Session {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::S0),
            1 => Some(Self::S1),
            2 => Some(Self::S2),
            3 => Some(Self::S3),
            _ => None,
        }
    }
}

/// Gen2 search target, written to the `GEN2_TARGET` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Gen2Target {
    A,
    B,
    #[strum(serialize = "AB")]
    Ab,
    #[strum(serialize = "BA")]
    Ba,
}

impl Gen2Target {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::Ab),
            3 => Some(Self::Ba),
            _ => None,
        }
    }
}
