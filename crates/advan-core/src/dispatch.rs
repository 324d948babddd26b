// ── Event stream dispatch ──
//
// Routes decoded stream messages: inventory items go through the engine's
// staleness filter into the working set and out to the listener, then the
// batch boundary triggers reconciliation. GPI transitions go straight to
// the listener.

use std::sync::Arc;

use tracing::{debug, warn};

use advan_api::{DeviceMessage, EventSink};

use crate::engine::{Engine, SessionControl};
use crate::listener::SharedListener;

pub(crate) struct Dispatcher<C> {
    engine: Arc<Engine<C>>,
    listener: Arc<SharedListener>,
}

impl<C: SessionControl> Dispatcher<C> {
    pub(crate) fn new(engine: Arc<Engine<C>>, listener: Arc<SharedListener>) -> Self {
        Self { engine, listener }
    }
}

impl<C: SessionControl> EventSink for Dispatcher<C> {
    async fn on_message(&self, message: DeviceMessage) {
        match message {
            DeviceMessage::Inventory(items) => {
                let listener = self.listener.get();
                let total = items.len();
                let mut fresh = 0usize;
                for item in items {
                    if let Some(read) = self.engine.record(item) {
                        fresh += 1;
                        listener.on_read(&read);
                    }
                }
                debug!(total, fresh, "inventory batch");
                self.engine.on_batch_complete().await;
            }
            DeviceMessage::Gpi { line, low_to_high } => {
                debug!(line, low_to_high, "gpi event");
                self.listener.get().on_gpi(line, low_to_high);
            }
        }
    }

    fn on_connection_lost(&self, error: Option<advan_api::Error>) {
        match &error {
            Some(e) => warn!(error = %e, "reader connection lost"),
            None => warn!("reader closed the event stream"),
        }
        self.listener.get().on_connection_lost();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use advan_api::InventoryItem;

    use super::*;
    use crate::error::CoreError;
    use crate::listener::ReaderListener;
    use crate::model::{MemoryBank, Operation, OperationOutput, Read};

    struct FixedStart;

    impl SessionControl for FixedStart {
        async fn active_read_mode(&self) -> Result<String, CoreError> {
            Ok("AUTONOMOUS".into())
        }
        async fn set_autonomous(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn start(&self) -> Result<Option<i64>, CoreError> {
            Ok(Some(1000))
        }
        async fn stop(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn execute(&self, _op: &Operation, _read: &Read) -> Result<OperationOutput, CoreError> {
            Ok(OperationOutput::Data("BEEF".into()))
        }
    }

    #[derive(Default)]
    struct Events {
        reads: Mutex<Vec<String>>,
        gpi: Mutex<Vec<(u32, bool)>>,
        lost: Mutex<usize>,
        results: Mutex<Vec<String>>,
    }

    impl ReaderListener for Events {
        fn on_read(&self, read: &Read) {
            self.reads.lock().unwrap().push(read.epc.clone());
        }
        fn on_gpi(&self, line: u32, low_to_high: bool) {
            self.gpi.lock().unwrap().push((line, low_to_high));
        }
        fn on_connection_lost(&self) {
            *self.lost.lock().unwrap() += 1;
        }
        fn on_operation_result(
            &self,
            _operation: &Operation,
            read: &Read,
            result: &Result<OperationOutput, CoreError>,
        ) {
            if let Ok(OperationOutput::Data(hex)) = result {
                self.results.lock().unwrap().push(format!("{}={hex}", read.epc));
            }
        }
    }

    fn setup() -> (Arc<Events>, Arc<Engine<FixedStart>>, Dispatcher<FixedStart>) {
        let events = Arc::new(Events::default());
        let listener = Arc::new(SharedListener::new(events.clone()));
        let engine = Arc::new(Engine::new(FixedStart, Arc::clone(&listener)));
        let dispatcher = Dispatcher::new(Arc::clone(&engine), listener);
        (events, engine, dispatcher)
    }

    fn item(epc: &str, ts: i64) -> InventoryItem {
        InventoryItem {
            timestamp: ts,
            epc: epc.into(),
            rssi: Some(-50.0),
            antenna: Some(1),
        }
    }

    #[tokio::test]
    async fn stale_items_are_not_delivered() {
        let (events, engine, dispatcher) = setup();
        engine.start().await.unwrap();

        dispatcher
            .on_message(DeviceMessage::Inventory(vec![
                item("aa", 999),
                item("bb", 1000),
                item("cc", 1001),
            ]))
            .await;

        assert_eq!(*events.reads.lock().unwrap(), vec!["BB", "CC"]);
    }

    #[tokio::test]
    async fn batch_end_runs_queued_operations() {
        let (events, engine, dispatcher) = setup();
        engine
            .enqueue(Operation::read_by_epc("BB", MemoryBank::Tid, 0, 2))
            .await
            .unwrap();

        dispatcher
            .on_message(DeviceMessage::Inventory(vec![item("bb", 1000)]))
            .await;

        assert_eq!(*events.results.lock().unwrap(), vec!["BB=BEEF"]);
        assert!(engine.pending_operations().is_empty());
    }

    #[tokio::test]
    async fn gpi_and_loss_reach_listener() {
        let (events, _engine, dispatcher) = setup();
        dispatcher
            .on_message(DeviceMessage::Gpi {
                line: 2,
                low_to_high: true,
            })
            .await;
        dispatcher.on_connection_lost(None);

        assert_eq!(*events.gpi.lock().unwrap(), vec![(2, true)]);
        assert_eq!(*events.lost.lock().unwrap(), 1);
    }
}
