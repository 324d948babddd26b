//! Session layer between `advan-api` and applications driving an
//! AdvanReader.
//!
//! - **[`Reader`]** is the facade. [`connect()`](Reader::connect) pushes
//!   [`ReaderSettings`] to the device over the control plane and opens the
//!   inventory event stream. Tag operations are queued and run when a
//!   matching tag is seen.
//!
//! - **[`Engine`]** owns the inventory session: the staleness baseline, the
//!   working set of reads collected since the last batch boundary, and the
//!   FIFO of pending [`Operation`]s. At each batch boundary it pauses the
//!   device, runs what it can, and resumes.
//!
//! - **[`ReaderListener`]** receives reads, GPI transitions, operation
//!   results and connection loss.

pub mod config;
mod dispatch;
pub mod engine;
pub mod error;
pub mod listener;
pub mod model;
pub mod reader;

pub use config::{DEFAULT_CONTROL_PORT, ReaderSettings};
pub use engine::{Engine, SessionControl, SessionState};
pub use error::CoreError;
pub use listener::{NoopListener, ReaderListener};
pub use model::{
    Device, LockAction, LockOptions, MemoryBank, Operation, OperationKind, OperationOutput, Read,
    normalize_epc,
};
pub use reader::{DeviceControl, Reader};
