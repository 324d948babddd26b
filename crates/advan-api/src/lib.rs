// advan-api: Async Rust client for AdvanReader RFID readers (HTTP control + event stream)

pub mod control;
pub mod devices;
pub mod error;
pub mod frame;
pub mod message;
pub mod models;
pub mod ops;
pub mod stream;
pub mod transport;
mod xml;

pub use control::ControlClient;
pub use error::{Error, FrameError};
pub use frame::FrameReader;
pub use message::{DeviceMessage, InventoryItem};
pub use models::{Device, Gen2Session, Gen2Target, LockAction, LockOptions, MemoryBank};
pub use ops::{LockTagRequest, ReadDataRequest, TagOpParams, WriteDataRequest};
pub use stream::{EventSink, EventStreamHandle};
pub use transport::TransportConfig;
