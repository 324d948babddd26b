// ── Reader facade ──
//
// Full lifecycle for one AdvanReader: settings application over the
// control plane, the inventory event stream, and tag operations routed
// through the reconciliation engine.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use advan_api::models::{AUTONOMOUS_DEVICE_MODE, AUTONOMOUS_READ_MODE};
use advan_api::{
    ControlClient, EventStreamHandle, Gen2Session, Gen2Target, LockTagRequest, ReadDataRequest,
    TagOpParams, WriteDataRequest,
};

use crate::config::ReaderSettings;
use crate::dispatch::Dispatcher;
use crate::engine::{Engine, SessionControl};
use crate::error::CoreError;
use crate::listener::{ReaderListener, SharedListener};
use crate::model::{
    Device, LockOptions, MemoryBank, Operation, OperationKind, OperationOutput, Read,
};

const PARAM_SESSION: &str = "GEN2_SESSION";
const PARAM_TARGET: &str = "GEN2_TARGET";
const PARAM_GPI_COUNT: &str = "DATA_GPI_NUMBER";
const PARAM_GPO_COUNT: &str = "DATA_GPO_NUMBER";

/// Word pointer of the EPC inside the EPC bank.
const EPC_WORD_POINTER: u32 = 2;
/// Word pointer of the PC word, which precedes the EPC.
const PC_WORD_POINTER: u32 = 1;

// ── DeviceControl ────────────────────────────────────────────────

/// Engine-facing control surface bound to the discovered device.
pub struct DeviceControl {
    client: ControlClient,
    device: ArcSwapOption<Device>,
    params: ArcSwap<TagOpParams>,
}

impl DeviceControl {
    fn new(client: ControlClient, params: TagOpParams) -> Self {
        Self {
            client,
            device: ArcSwapOption::empty(),
            params: ArcSwap::from_pointee(params),
        }
    }

    pub fn client(&self) -> &ControlClient {
        &self.client
    }

    /// The discovered device, or `NotConnected` before settings were applied.
    pub fn device(&self) -> Result<Arc<Device>, CoreError> {
        self.device.load_full().ok_or(CoreError::NotConnected)
    }
}

impl SessionControl for DeviceControl {
    async fn active_read_mode(&self) -> Result<String, CoreError> {
        let device = self.device()?;
        Ok(self.client.active_read_mode(&device.id).await?)
    }

    async fn set_autonomous(&self) -> Result<(), CoreError> {
        let device = self.device()?;
        self.client
            .set_active_device_mode(&device.id, AUTONOMOUS_DEVICE_MODE)
            .await?;
        Ok(())
    }

    async fn start(&self) -> Result<Option<i64>, CoreError> {
        let device = self.device()?;
        Ok(self.client.start(&device.id).await?)
    }

    async fn stop(&self) -> Result<(), CoreError> {
        let device = self.device()?;
        self.client.stop(&device.id).await?;
        Ok(())
    }

    async fn execute(&self, op: &Operation, read: &Read) -> Result<OperationOutput, CoreError> {
        let device = self.device()?;
        let params = **self.params.load();
        let epc = Some(read.epc.as_str());
        let access_password = op.access_password();

        match op.kind() {
            OperationKind::ReadByBank {
                bank,
                offset,
                length,
            }
            | OperationKind::ReadByEpc {
                bank,
                offset,
                length,
            } => {
                let req = ReadDataRequest {
                    epc,
                    bank: *bank,
                    offset: *offset,
                    length: *length,
                    access_password,
                };
                let data = self.client.read_data(&device.id, &req, &params).await?;
                Ok(OperationOutput::Data(data))
            }
            OperationKind::WriteData { bank, offset, data } => {
                let req = WriteDataRequest {
                    epc,
                    bank: *bank,
                    offset: *offset,
                    data,
                    access_password,
                };
                self.client.write_data(&device.id, &req, &params).await?;
                Ok(OperationOutput::Done)
            }
            OperationKind::SetKillPassword { kill_password } => {
                let req = LockTagRequest {
                    epc,
                    access_password,
                    new_kill_password: Some(kill_password),
                    ..LockTagRequest::default()
                };
                self.client.lock_tag(&device.id, &req, &params).await?;
                Ok(OperationOutput::Done)
            }
            OperationKind::LockTag {
                new_access_password,
                lock,
            } => {
                let req = LockTagRequest {
                    epc,
                    access_password,
                    new_access_password: new_access_password.as_deref(),
                    new_kill_password: None,
                    lock: *lock,
                };
                self.client.lock_tag(&device.id, &req, &params).await?;
                Ok(OperationOutput::Done)
            }
        }
    }
}

// ── Reader ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ReaderInner>`. Connection fields of the
/// settings (`host`, `port`, `event_port`, `request_timeout`) are fixed at
/// construction; [`apply_settings`](Self::apply_settings) updates the RF
/// and tag-operation fields.
#[derive(Clone)]
pub struct Reader {
    inner: Arc<ReaderInner>,
}

struct ReaderInner {
    settings: Mutex<ReaderSettings>,
    engine: Arc<Engine<DeviceControl>>,
    listener: Arc<SharedListener>,
    stream: Mutex<Option<EventStreamHandle>>,
    gpi_count: AtomicU32,
    gpo_count: AtomicU32,
}

impl Reader {
    /// Create a reader from settings. Does NOT connect -- call
    /// [`connect()`](Self::connect) to configure the device and open the
    /// event stream.
    pub fn new(settings: ReaderSettings) -> Result<Self, CoreError> {
        settings.validate()?;
        let client = ControlClient::from_host(&settings.host, settings.port, &settings.transport())?;
        Ok(Self::with_client(settings, client))
    }

    /// Create a reader around an existing control client.
    pub fn with_client(settings: ReaderSettings, client: ControlClient) -> Self {
        let listener = Arc::new(SharedListener::default());
        let control = DeviceControl::new(client, settings.tag_op_params());
        let engine = Arc::new(Engine::new(control, Arc::clone(&listener)));

        Self {
            inner: Arc::new(ReaderInner {
                settings: Mutex::new(settings),
                engine,
                listener,
                stream: Mutex::new(None),
                gpi_count: AtomicU32::new(0),
                gpo_count: AtomicU32::new(0),
            }),
        }
    }

    /// Replace the listener that receives reads, GPI events and results.
    pub fn set_listener(&self, listener: Arc<dyn ReaderListener>) {
        self.inner.listener.set(listener);
    }

    pub fn settings(&self) -> ReaderSettings {
        self.inner
            .settings
            .lock()
            .expect("settings lock poisoned")
            .clone()
    }

    pub fn engine(&self) -> &Engine<DeviceControl> {
        &self.inner.engine
    }

    fn control(&self) -> &DeviceControl {
        self.inner.engine.control()
    }

    fn device_id(&self) -> Result<String, CoreError> {
        Ok(self.control().device()?.id.clone())
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Apply the current settings, then open the event stream.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if self.is_connected() {
            return Ok(());
        }
        let settings = self.settings();
        self.apply_settings(settings.clone()).await?;

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.inner.engine),
            Arc::clone(&self.inner.listener),
        ));
        let handle = EventStreamHandle::connect(
            &settings.host,
            settings.event_port,
            dispatcher,
            CancellationToken::new(),
        )
        .await?;

        let previous = self
            .inner
            .stream
            .lock()
            .expect("stream lock poisoned")
            .replace(handle);
        if let Some(previous) = previous {
            previous.shutdown();
        }
        info!(host = %settings.host, "reader connected");
        Ok(())
    }

    /// `true` while the event stream worker is alive.
    pub fn is_connected(&self) -> bool {
        self.inner
            .stream
            .lock()
            .expect("stream lock poisoned")
            .as_ref()
            .is_some_and(EventStreamHandle::is_running)
    }

    /// Stop inventory and close the event stream.
    ///
    /// Does not fire `on_connection_lost`. Errors stopping the device are
    /// logged, not returned.
    pub async fn disconnect(&self) {
        if let Err(e) = self.inner.engine.stop().await {
            warn!(error = %e, "could not stop inventory while disconnecting");
        }
        let handle = self
            .inner
            .stream
            .lock()
            .expect("stream lock poisoned")
            .take();
        if let Some(handle) = handle {
            handle.shutdown();
            handle.join().await;
        }
        info!("reader disconnected");
    }

    /// Push `settings` to the device.
    ///
    /// Validation runs before any request. Inventory is paused while the
    /// device is reconfigured and restarted afterwards if it was running. A
    /// failure part way leaves inventory stopped.
    pub async fn apply_settings(&self, settings: ReaderSettings) -> Result<(), CoreError> {
        settings.validate()?;
        let session = settings.gen2_session()?;
        let target = settings.gen2_target()?;

        let pending = &settings;
        let (gpi, gpo) = self
            .inner
            .engine
            .reconfigure(move || self.push_settings(pending, session, target))
            .await?;
        self.inner.gpi_count.store(gpi, Ordering::Relaxed);
        self.inner.gpo_count.store(gpo, Ordering::Relaxed);

        info!(host = %settings.host, antennas = settings.antennas.len(), gpi, gpo, "settings applied");
        *self.inner.settings.lock().expect("settings lock poisoned") = settings;
        Ok(())
    }

    /// Discover the device, stop it and write the RF configuration.
    /// Returns the GPI and GPO line counts.
    async fn push_settings(
        &self,
        settings: &ReaderSettings,
        session: Gen2Session,
        target: Gen2Target,
    ) -> Result<(u32, u32), CoreError> {
        let control = self.control();
        let client = control.client();

        let device = client
            .list_devices(&settings.host)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::Configuration {
                message: format!("reader at {} reported no devices", settings.host),
            })?;
        debug!(device = %device.id, family = %device.family, "using device");
        let id = device.id.clone();
        control.device.store(Some(Arc::new(device)));
        control.params.store(Arc::new(settings.tag_op_params()));

        client.stop(&id).await?;

        let modes = client.device_modes(&id).await?;
        if !modes.iter().any(|m| m == AUTONOMOUS_READ_MODE) {
            return Err(CoreError::Configuration {
                message: format!("device {id} does not support autonomous mode"),
            });
        }

        client
            .configure_antennas(
                &id,
                &settings.antennas,
                &settings.tx_power,
                &settings.rx_sensitivity,
            )
            .await?;
        client.set_write_power(&id, settings.write_power).await?;
        client
            .set_parameter(&id, PARAM_SESSION, &session.to_string())
            .await?;
        client
            .set_parameter(&id, PARAM_TARGET, &target.to_string())
            .await?;

        let gpi = count_parameter(client.get_parameter(&id, PARAM_GPI_COUNT).await?);
        let gpo = count_parameter(client.get_parameter(&id, PARAM_GPO_COUNT).await?);
        Ok((gpi, gpo))
    }

    /// Persist the running configuration on the device.
    pub async fn save_configuration(&self) -> Result<(), CoreError> {
        let id = self.device_id()?;
        self.control().client().save_configuration(&id).await?;
        Ok(())
    }

    // ── Inventory ────────────────────────────────────────────────

    pub async fn start_read(&self) -> Result<(), CoreError> {
        self.inner.engine.start().await
    }

    pub async fn stop(&self) -> Result<(), CoreError> {
        self.inner.engine.stop().await
    }

    pub fn is_reading(&self) -> bool {
        self.inner.engine.is_reading()
    }

    /// Queue an operation; inventory starts if it is not running.
    pub async fn enqueue(&self, op: Operation) -> Result<(), CoreError> {
        self.inner.engine.enqueue(op).await
    }

    // ── Tag operations ───────────────────────────────────────────

    /// Read memory from every tag seen in the next inventory window.
    pub async fn read_data(
        &self,
        bank: MemoryBank,
        offset: u32,
        length: u32,
        access_password: Option<&str>,
    ) -> Result<(), CoreError> {
        self.enqueue(
            Operation::read_by_bank(bank, offset, length).with_access_password(access_password),
        )
        .await
    }

    /// Read memory from one tag once it is seen.
    pub async fn read_data_by_epc(
        &self,
        epc: &str,
        bank: MemoryBank,
        offset: u32,
        length: u32,
        access_password: Option<&str>,
    ) -> Result<(), CoreError> {
        self.enqueue(
            Operation::read_by_epc(epc, bank, offset, length).with_access_password(access_password),
        )
        .await
    }

    /// Write hex `data` at `word_pointer`. `epc = None` writes every tag seen.
    pub async fn write_data(
        &self,
        epc: Option<&str>,
        data: &str,
        bank: MemoryBank,
        word_pointer: u32,
        access_password: Option<&str>,
    ) -> Result<(), CoreError> {
        self.enqueue(
            Operation::write_data(epc, bank, word_pointer, data).with_access_password(access_password),
        )
        .await
    }

    /// Rewrite the EPC of tag `src` to `tgt`.
    ///
    /// When the length changes, the PC word is rewritten along with the EPC
    /// so the tag reports the new length.
    pub async fn write_epc(
        &self,
        src: &str,
        tgt: &str,
        access_password: Option<&str>,
    ) -> Result<(), CoreError> {
        let (word_pointer, data) = epc_rewrite(src, tgt)?;
        self.write_data(Some(src), &data, MemoryBank::Epc, word_pointer, access_password)
            .await
    }

    pub async fn set_kill_password(
        &self,
        epc: Option<&str>,
        access_password: Option<&str>,
        kill_password: &str,
    ) -> Result<(), CoreError> {
        self.enqueue(
            Operation::set_kill_password(epc, kill_password).with_access_password(access_password),
        )
        .await
    }

    /// Apply lock actions, authenticating with `access_password`.
    pub async fn lock_tag(
        &self,
        epc: Option<&str>,
        access_password: Option<&str>,
        lock: LockOptions,
    ) -> Result<(), CoreError> {
        self.enqueue(Operation::lock_tag(epc, None, Some(lock)).with_access_password(access_password))
            .await
    }

    /// Set a new access password, then lock with it.
    pub async fn change_access_password_and_lock(
        &self,
        epc: Option<&str>,
        old_access_password: Option<&str>,
        new_access_password: &str,
        lock: Option<LockOptions>,
    ) -> Result<(), CoreError> {
        self.enqueue(
            Operation::lock_tag(epc, Some(new_access_password), lock)
                .with_access_password(old_access_password),
        )
        .await
    }

    // ── GPIO ─────────────────────────────────────────────────────

    pub fn gpi_count(&self) -> u32 {
        self.inner.gpi_count.load(Ordering::Relaxed)
    }

    pub fn gpo_count(&self) -> u32 {
        self.inner.gpo_count.load(Ordering::Relaxed)
    }

    pub async fn set_gpo(&self, line: u32, state: bool) -> Result<(), CoreError> {
        let id = self.device_id()?;
        self.control().client().set_gpo(&id, line, state).await?;
        Ok(())
    }

    /// Set several outputs, keyed by line number.
    pub async fn set_gpo_map(&self, states: &BTreeMap<u32, bool>) -> Result<(), CoreError> {
        for (&line, &state) in states {
            self.set_gpo(line, state).await?;
        }
        Ok(())
    }

    /// Set outputs from a slice; element `i` drives line `i + 1`.
    pub async fn set_gpo_slice(&self, states: &[bool]) -> Result<(), CoreError> {
        for (line, &state) in (1u32..).zip(states) {
            self.set_gpo(line, state).await?;
        }
        Ok(())
    }

    pub async fn is_gpi(&self, line: u32) -> Result<bool, CoreError> {
        let id = self.device_id()?;
        Ok(self.control().client().gpi(&id, line).await?)
    }

    /// Level of every input, keyed by line number.
    pub async fn gpi_state(&self) -> Result<BTreeMap<u32, bool>, CoreError> {
        let id = self.device_id()?;
        Ok(self.control().client().gpi_all(&id).await?)
    }

    // ── Device info ──────────────────────────────────────────────

    pub fn device(&self) -> Option<Arc<Device>> {
        self.control().device().ok()
    }

    pub fn serial(&self) -> Option<String> {
        self.device().map(|d| d.serial.clone())
    }

    pub fn model_name(&self) -> Option<String> {
        self.device().map(|d| d.family.clone())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn count_parameter(value: Option<String>) -> u32 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Word pointer and data for rewriting EPC `src` as `tgt`.
fn epc_rewrite(src: &str, tgt: &str) -> Result<(u32, String), CoreError> {
    let src = src.trim();
    let tgt = tgt.trim();
    for (name, epc) in [("source", src), ("target", tgt)] {
        if epc.is_empty() || epc.len() % 4 != 0 {
            return Err(CoreError::Validation {
                message: format!("{name} EPC must be a non-empty multiple of 16 bits: {epc:?}"),
            });
        }
        if !epc.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::Validation {
                message: format!("{name} EPC is not hex: {epc:?}"),
            });
        }
    }

    if src.len() == tgt.len() {
        return Ok((EPC_WORD_POINTER, tgt.to_ascii_uppercase()));
    }

    let src_words = u32::try_from(src.len() / 4).unwrap_or(u32::MAX);
    let tgt_words = u32::try_from(tgt.len() / 4).unwrap_or(u32::MAX);
    // Keep the low PC bits, replace the length field.
    let pc = (((src_words << 11) & 0x7FF) | (tgt_words << 11)) & 0xFFFF;
    Ok((PC_WORD_POINTER, format!("{pc:04X}{}", tgt.to_ascii_uppercase())))
}
