// ── Reader event callbacks ──

use std::sync::{Arc, RwLock};

use crate::error::CoreError;
use crate::model::{Operation, OperationOutput, Read};

/// Receiver for everything the reader reports on its own.
///
/// Stream-sourced callbacks run synchronously on the event-stream worker,
/// so implementations should hand long work off elsewhere. Every method
/// defaults to a no-op.
pub trait ReaderListener: Send + Sync {
    /// A tag was seen during inventory.
    fn on_read(&self, _read: &Read) {}

    /// A digital input changed level.
    fn on_gpi(&self, _line: u32, _low_to_high: bool) {}

    /// The event stream ended without `disconnect()` being called.
    fn on_connection_lost(&self) {}

    /// A queued operation ran against `read`.
    fn on_operation_result(
        &self,
        _operation: &Operation,
        _read: &Read,
        _result: &Result<OperationOutput, CoreError>,
    ) {
    }
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ReaderListener for NoopListener {}

/// Swappable listener slot shared by the reader, its engine and the stream
/// dispatcher.
pub(crate) struct SharedListener {
    inner: RwLock<Arc<dyn ReaderListener>>,
}

impl SharedListener {
    pub(crate) fn new(listener: Arc<dyn ReaderListener>) -> Self {
        Self {
            inner: RwLock::new(listener),
        }
    }

    pub(crate) fn set(&self, listener: Arc<dyn ReaderListener>) {
        *self.inner.write().expect("listener lock poisoned") = listener;
    }

    /// Current listener. The lock is released before the caller uses it.
    pub(crate) fn get(&self) -> Arc<dyn ReaderListener> {
        Arc::clone(&self.inner.read().expect("listener lock poisoned"))
    }
}

impl Default for SharedListener {
    fn default() -> Self {
        Self::new(Arc::new(NoopListener))
    }
}
