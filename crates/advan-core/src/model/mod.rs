// ── Domain model ──
//
// Canonical types the reader facade and the reconciliation engine share.
// Wire-level enumerations (memory banks, lock actions) come from
// `advan-api` unchanged and are re-exported here.

pub mod operation;
pub mod read;

// ── Re-exports ──────────────────────────────────────────────────────

pub use operation::{Operation, OperationKind, OperationOutput};
pub use read::{Read, normalize_epc};

pub use advan_api::{Device, LockAction, LockOptions, MemoryBank};
