// ── Reconciliation engine ──
//
// Owns the operation queue, the working read set and the session state.
// Inventory batches feed the working set; after each batch, queued
// operations are matched against the tags just seen. Matching requires RF
// to be quiet, so a cycle pauses the inventory, executes what it can,
// re-queues what it could not match, and resumes.
//
// State sits behind one std mutex that is never held across an await.
// Device lifecycle calls (start, stop, and whole cycles) are serialised by
// an async gate so two transitions never hit the device at once.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, trace, warn};

use advan_api::InventoryItem;
use advan_api::models::AUTONOMOUS_READ_MODE;

use crate::error::CoreError;
use crate::listener::SharedListener;
use crate::model::{Operation, OperationOutput, Read};

/// Baseline before the first start: nothing is fresh enough.
pub const BASELINE_STOPPED: i64 = i64::MAX;

/// Baseline when the device reported no start timestamp: everything is.
pub const BASELINE_UNFILTERED: i64 = -1;

// ── Device seam ──────────────────────────────────────────────────────

/// Device calls the engine needs. Implemented over the HTTP control client
/// by the reader facade and by recording mocks in tests.
pub trait SessionControl: Send + Sync + 'static {
    fn active_read_mode(&self) -> impl Future<Output = Result<String, CoreError>> + Send;

    /// Switch the device into autonomous streaming mode.
    fn set_autonomous(&self) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Start RF. Returns the device's start timestamp, if it reports one.
    fn start(&self) -> impl Future<Output = Result<Option<i64>, CoreError>> + Send;

    fn stop(&self) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Run `op` against the tag in `read`.
    fn execute(
        &self,
        op: &Operation,
        read: &Read,
    ) -> impl Future<Output = Result<OperationOutput, CoreError>> + Send;
}

// ── State ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Reading,
    Singularizing,
}

struct EngineState {
    queue: VecDeque<Operation>,
    working: HashMap<String, Read>,
    session: SessionState,
    /// Resume inventory when the current cycle ends. Only meaningful while
    /// singularizing; `stop()` clears it.
    armed: bool,
    /// Items older than this device timestamp are stale.
    baseline: i64,
}

// ── Engine ───────────────────────────────────────────────────────────

pub struct Engine<C> {
    control: C,
    listener: Arc<SharedListener>,
    state: Mutex<EngineState>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl<C: SessionControl> Engine<C> {
    pub(crate) fn new(control: C, listener: Arc<SharedListener>) -> Self {
        Self {
            control,
            listener,
            state: Mutex::new(EngineState {
                queue: VecDeque::new(),
                working: HashMap::new(),
                session: SessionState::Idle,
                armed: false,
                baseline: BASELINE_STOPPED,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state lock poisoned")
    }

    // ── Observers ────────────────────────────────────────────────────

    pub fn session_state(&self) -> SessionState {
        self.lock().session
    }

    /// `true` while inventory is running or will resume after the current
    /// cycle.
    pub fn is_reading(&self) -> bool {
        let state = self.lock();
        match state.session {
            SessionState::Reading => true,
            SessionState::Singularizing => state.armed,
            SessionState::Idle => false,
        }
    }

    /// Current staleness baseline.
    pub fn baseline(&self) -> i64 {
        self.lock().baseline
    }

    pub fn pending_operations(&self) -> Vec<Operation> {
        self.lock().queue.iter().cloned().collect()
    }

    pub fn working_set_len(&self) -> usize {
        self.lock().working.len()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Begin inventory. A no-op unless the session is idle.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.lock().session != SessionState::Idle {
            return Ok(());
        }
        let _gate = self.lifecycle.lock().await;
        if self.lock().session != SessionState::Idle {
            return Ok(());
        }

        let mode = self.control.active_read_mode().await?;
        if mode != AUTONOMOUS_READ_MODE {
            debug!(%mode, "switching device to autonomous mode");
            self.control.set_autonomous().await?;
        }
        let ts = self.control.start().await?;

        let mut state = self.lock();
        state.baseline = ts.unwrap_or(BASELINE_UNFILTERED);
        state.session = SessionState::Reading;
        info!(baseline = state.baseline, "inventory started");
        Ok(())
    }

    /// End inventory. A no-op when idle.
    ///
    /// During a cycle this only cancels the resume; the cycle finishes its
    /// operations and settles to idle with the device already paused.
    pub async fn stop(&self) -> Result<(), CoreError> {
        if self.disarm_cycle() {
            return Ok(());
        }

        // An idle session may have a start in flight; wait for it.
        let _gate = self.lifecycle.lock().await;
        {
            let mut state = self.lock();
            if state.session != SessionState::Reading {
                return Ok(());
            }
            state.baseline = BASELINE_STOPPED;
            state.session = SessionState::Idle;
        }
        self.control.stop().await?;
        info!("inventory stopped");
        Ok(())
    }

    /// Cancel the resume of a running cycle. Returns `false` outside one.
    fn disarm_cycle(&self) -> bool {
        let mut state = self.lock();
        if state.session != SessionState::Singularizing {
            return false;
        }
        state.armed = false;
        state.baseline = BASELINE_STOPPED;
        info!("inventory stop requested during singularization");
        true
    }

    /// Run `configure` with inventory lifecycle held off.
    ///
    /// `configure` is expected to pause the device. If the session was
    /// reading, inventory is restarted afterwards with the baseline kept. If
    /// `configure` or the restart fails, the session drops to idle so the
    /// next `start()` or `enqueue()` brings RF back.
    pub async fn reconfigure<F, Fut, T>(&self, configure: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let _gate = self.lifecycle.lock().await;
        let result = configure().await;
        if self.lock().session != SessionState::Reading {
            return result;
        }

        let result = match result {
            Ok(value) => self.control.start().await.map(|_| value),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(error = %e, "reconfiguration failed, inventory stopped");
            let mut state = self.lock();
            state.session = SessionState::Idle;
            state.baseline = BASELINE_STOPPED;
        }
        result
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Queue `op`, starting inventory if the session is idle.
    pub async fn enqueue(&self, op: Operation) -> Result<(), CoreError> {
        let should_start = {
            let mut state = self.lock();
            debug!(op = op.name(), epc = ?op.epc(), "operation queued");
            state.queue.push_back(op);
            state.session == SessionState::Idle
        };
        if should_start {
            self.start().await?;
        }
        Ok(())
    }

    // ── Inventory ────────────────────────────────────────────────────

    /// Record one inventory item if it is not older than the baseline.
    ///
    /// Returns the canonical read for fresh items.
    pub fn record(&self, item: InventoryItem) -> Option<Read> {
        let mut state = self.lock();
        if item.timestamp < state.baseline {
            trace!(ts = item.timestamp, baseline = state.baseline, "dropping stale read");
            return None;
        }
        let read = Read::from(item);
        trace!(epc = %read.epc, rssi = ?read.rssi, antenna = ?read.antenna_id, "read");
        state.working.insert(read.epc.clone(), read.clone());
        Some(read)
    }

    /// Run a singularization cycle if operations are waiting.
    pub async fn on_batch_complete(&self) {
        {
            let state = self.lock();
            if state.queue.is_empty() || state.session == SessionState::Singularizing {
                return;
            }
        }
        let _gate = self.lifecycle.lock().await;

        // (a) snapshot
        let (ops, window, was_reading) = {
            let mut state = self.lock();
            if state.queue.is_empty() || state.session == SessionState::Singularizing {
                return;
            }
            let was_reading = state.session == SessionState::Reading;
            state.session = SessionState::Singularizing;
            state.armed = was_reading;
            let ops: Vec<Operation> = state.queue.drain(..).collect();
            (ops, state.working.clone(), was_reading)
        };
        info!(ops = ops.len(), tags = window.len(), "singularization cycle");

        // (b) pause without touching the baseline
        if let Err(e) = self.control.stop().await {
            warn!(error = %e, "could not pause inventory, operations stay queued");
            self.abort_cycle(ops, was_reading).await;
            return;
        }

        // (c) execute
        let mut unresolved = Vec::new();
        for op in ops {
            if op.is_broadcast() {
                for read in window.values() {
                    self.run(&op, read).await;
                }
            } else if let Some(read) = window.values().find(|read| op.targets(read)) {
                self.run(&op, read).await;
            } else {
                debug!(op = op.name(), epc = ?op.epc(), "tag not seen, deferring");
                unresolved.push(op);
            }
        }

        // (d)-(e) clear the window, put deferred ops back in front
        let resume = {
            let mut state = self.lock();
            state.working.clear();
            for op in unresolved.into_iter().rev() {
                state.queue.push_front(op);
            }
            if !state.armed {
                state.session = SessionState::Idle;
            }
            state.armed
        };

        // (f) resume
        if resume {
            self.resume().await;
        }
    }

    async fn run(&self, op: &Operation, read: &Read) {
        let result = self.control.execute(op, read).await;
        if let Err(e) = &result {
            warn!(op = op.name(), epc = %read.epc, error = %e, "tag operation failed");
        }
        self.listener.get().on_operation_result(op, read, &result);
    }

    /// Restart inventory after a cycle, leaving the baseline alone.
    async fn resume(&self) {
        let result = self.control.start().await;

        let stop_again = {
            let mut state = self.lock();
            match (&result, state.armed) {
                (Ok(_), true) => {
                    state.session = SessionState::Reading;
                    false
                }
                (Ok(_), false) => {
                    state.session = SessionState::Idle;
                    true
                }
                (Err(e), _) => {
                    warn!(error = %e, "could not resume inventory");
                    state.session = SessionState::Idle;
                    state.baseline = BASELINE_STOPPED;
                    false
                }
            }
        };

        // stop() arrived while the resume call was in flight
        if stop_again {
            if let Err(e) = self.control.stop().await {
                warn!(error = %e, "could not stop inventory after cancelled resume");
            }
        }
    }

    /// The pause failed: nothing ran, restore the queue and prior state.
    async fn abort_cycle(&self, ops: Vec<Operation>, was_reading: bool) {
        let stop_again = {
            let mut state = self.lock();
            for op in ops.into_iter().rev() {
                state.queue.push_front(op);
            }
            if state.armed {
                state.session = SessionState::Reading;
                false
            } else {
                state.session = SessionState::Idle;
                was_reading
            }
        };

        if stop_again {
            if let Err(e) = self.control.stop().await {
                warn!(error = %e, "could not stop inventory");
            }
        }
    }
}
