// ── Queued tag operations ──
//
// An `Operation` is a caller request waiting for the reader to see a
// matching tag. Operations without an EPC are broadcasts: they run once
// against every tag in the current listening window.

use strum::IntoStaticStr;

use super::read::{Read, normalize_epc};
use advan_api::{LockOptions, MemoryBank};

/// What to do to the tag once it has been singled out.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    /// Read memory from whichever tags are in the field.
    ReadByBank {
        bank: MemoryBank,
        offset: u32,
        length: u32,
    },
    /// Read memory from one specific tag.
    ReadByEpc {
        bank: MemoryBank,
        offset: u32,
        length: u32,
    },
    WriteData {
        bank: MemoryBank,
        /// Word pointer.
        offset: u32,
        data: String,
    },
    SetKillPassword { kill_password: String },
    /// Optional access-password change followed by optional lock actions.
    LockTag {
        new_access_password: Option<String>,
        lock: Option<LockOptions>,
    },
}

/// A pending tag operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    epc: Option<String>,
    access_password: Option<String>,
    kind: OperationKind,
}

impl Operation {
    fn new(epc: Option<&str>, kind: OperationKind) -> Self {
        Self {
            epc: epc.map(normalize_epc).filter(|e| !e.is_empty()),
            access_password: None,
            kind,
        }
    }

    /// Read `length` words from every tag in the field.
    pub fn read_by_bank(bank: MemoryBank, offset: u32, length: u32) -> Self {
        Self::new(
            None,
            OperationKind::ReadByBank {
                bank,
                offset,
                length,
            },
        )
    }

    pub fn read_by_epc(epc: &str, bank: MemoryBank, offset: u32, length: u32) -> Self {
        Self::new(
            Some(epc),
            OperationKind::ReadByEpc {
                bank,
                offset,
                length,
            },
        )
    }

    /// Write hex `data` at word `offset`. `epc = None` writes every tag seen.
    pub fn write_data(epc: Option<&str>, bank: MemoryBank, offset: u32, data: &str) -> Self {
        Self::new(
            epc,
            OperationKind::WriteData {
                bank,
                offset,
                data: data.to_owned(),
            },
        )
    }

    pub fn set_kill_password(epc: Option<&str>, kill_password: &str) -> Self {
        Self::new(
            epc,
            OperationKind::SetKillPassword {
                kill_password: kill_password.to_owned(),
            },
        )
    }

    pub fn lock_tag(
        epc: Option<&str>,
        new_access_password: Option<&str>,
        lock: Option<LockOptions>,
    ) -> Self {
        Self::new(
            epc,
            OperationKind::LockTag {
                new_access_password: new_access_password.map(str::to_owned),
                lock,
            },
        )
    }

    /// Authenticate with `password` before operating on the tag.
    #[must_use]
    pub fn with_access_password(mut self, password: Option<&str>) -> Self {
        self.access_password = password
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned);
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn epc(&self) -> Option<&str> {
        self.epc.as_deref()
    }

    pub fn access_password(&self) -> Option<&str> {
        self.access_password.as_deref()
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// Short name for logs, e.g. `write_data`.
    pub fn name(&self) -> &'static str {
        (&self.kind).into()
    }

    /// `true` when the operation applies to every tag in the window.
    pub fn is_broadcast(&self) -> bool {
        self.epc.is_none()
    }

    /// Whether this operation should run against `read`.
    pub fn targets(&self, read: &Read) -> bool {
        self.epc.as_deref().is_none_or(|epc| epc == read.epc)
    }
}

/// What a successful tag operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    /// Hex words read from the tag.
    Data(String),
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epc_is_canonicalised() {
        let op = Operation::read_by_epc("aabb ", MemoryBank::Tid, 0, 2);
        assert_eq!(op.epc(), Some("AABB"));
        assert!(op.targets(&Read::new("AABB")));
        assert!(!op.targets(&Read::new("CCDD")));
    }

    #[test]
    fn missing_epc_is_a_broadcast() {
        let op = Operation::read_by_bank(MemoryBank::User, 0, 4);
        assert!(op.is_broadcast());
        assert!(op.targets(&Read::new("AABB")));

        let blank = Operation::write_data(Some("   "), MemoryBank::User, 0, "0000");
        assert!(blank.is_broadcast());
    }

    #[test]
    fn blank_access_password_is_dropped() {
        let op = Operation::set_kill_password(Some("AABB"), "DEADBEEF").with_access_password(Some(""));
        assert_eq!(op.access_password(), None);

        let op = op.with_access_password(Some("12345678"));
        assert_eq!(op.access_password(), Some("12345678"));
    }

    #[test]
    fn names_follow_kind() {
        assert_eq!(Operation::lock_tag(None, None, Some(LockOptions::LOCK_ALL)).name(), "lock_tag");
        assert_eq!(
            Operation::write_data(None, MemoryBank::Epc, 2, "AABB").name(),
            "write_data"
        );
    }
}
