// Tag-level operations executed through `PUT /devices/{id}/execOp`.
//
// Each call is one `<request>` holding an `<op>` element and a `<params>`
// block. The params optionally narrow the operation to a single EPC with a
// Gen2 select filter.

use tracing::debug;

use crate::control::ControlClient;
use crate::error::Error;
use crate::models::{LockOptions, MemoryBank};
use crate::xml::{self, Element};

const OP_PACKAGE: &str = "com.keonn.spec.reader.op";
const SELECT_TAG_FILTER: &str = "com.keonn.spec.filter.SelectTagFilter";

/// Bit offset of the EPC inside the EPC bank (past CRC and PC words).
const EPC_BIT_POINTER: u32 = 32;

/// Default per-operation air timeout, in milliseconds.
pub const DEFAULT_TAG_OP_TIMEOUT_MS: u64 = 1000;

/// Default number of write retries the device attempts.
pub const DEFAULT_WRITE_RETRIES: u32 = 2;

// ── Parameters ───────────────────────────────────────────────────────

/// Execution parameters attached to every tag operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagOpParams {
    pub timeout_ms: u64,
    pub write_retries: u32,
    /// Restrict the operation to one antenna port.
    pub antenna: Option<u32>,
}

impl Default for TagOpParams {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TAG_OP_TIMEOUT_MS,
            write_retries: DEFAULT_WRITE_RETRIES,
            antenna: None,
        }
    }
}

// ── Requests ─────────────────────────────────────────────────────────

/// Read `length` words from `bank` starting at word `offset`.
#[derive(Debug, Clone, Copy)]
pub struct ReadDataRequest<'a> {
    /// Tag to select; `None` lets the device pick any tag in the field.
    pub epc: Option<&'a str>,
    pub bank: MemoryBank,
    pub offset: u32,
    pub length: u32,
    pub access_password: Option<&'a str>,
}

/// Write hex `data` into `bank` starting at word `offset`.
#[derive(Debug, Clone, Copy)]
pub struct WriteDataRequest<'a> {
    pub epc: Option<&'a str>,
    pub bank: MemoryBank,
    pub offset: u32,
    pub data: &'a str,
    pub access_password: Option<&'a str>,
}

/// Password changes and/or lock actions against one tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockTagRequest<'a> {
    pub epc: Option<&'a str>,
    /// Current access password.
    pub access_password: Option<&'a str>,
    pub new_access_password: Option<&'a str>,
    pub new_kill_password: Option<&'a str>,
    /// Lock actions; `None` skips the lock step entirely.
    pub lock: Option<LockOptions>,
}

impl ControlClient {
    /// Send a rendered operation document. Returns the raw response body.
    pub async fn execute_operation(&self, device_id: &str, request: String) -> Result<String, Error> {
        self.put(self.device_url(device_id, "execOp")?, Some(request))
            .await
    }

    /// Read tag memory. Returns the hex words the device reports.
    pub async fn read_data(
        &self,
        device_id: &str,
        req: &ReadDataRequest<'_>,
        params: &TagOpParams,
    ) -> Result<String, Error> {
        debug!(epc = ?req.epc, bank = %req.bank, offset = req.offset, length = req.length, "read data");
        let body = read_data_request(req, params).render();
        let resp = self.execute_operation(device_id, body).await?;
        let doc = xml::parse(&resp)?;
        Ok(xml::first_text(&doc, &["response", "data", "result"])
            .map(str::to_owned)
            .unwrap_or_default())
    }

    pub async fn write_data(
        &self,
        device_id: &str,
        req: &WriteDataRequest<'_>,
        params: &TagOpParams,
    ) -> Result<(), Error> {
        debug!(epc = ?req.epc, bank = %req.bank, offset = req.offset, "write data");
        let body = write_data_request(req, params).render();
        self.execute_operation(device_id, body).await?;
        Ok(())
    }

    /// Change passwords, then apply lock actions.
    ///
    /// Password changes go out as a commission operation first; the lock
    /// operation that follows authenticates with the new access password
    /// when one was set. Either step is skipped when it has nothing to do.
    pub async fn lock_tag(
        &self,
        device_id: &str,
        req: &LockTagRequest<'_>,
        params: &TagOpParams,
    ) -> Result<(), Error> {
        let current = req.access_password.unwrap_or("");

        if req.new_access_password.is_some() || req.new_kill_password.is_some() {
            debug!(epc = ?req.epc, "commission tag passwords");
            let body = commission_request(req, current, params).render();
            self.execute_operation(device_id, body).await?;
        }

        if let Some(lock) = req.lock {
            let password = req.new_access_password.unwrap_or(current);
            debug!(epc = ?req.epc, locks = %lock.to_locks_string(), "lock tag");
            let body = lock_request(req.epc, password, &lock, params).render();
            self.execute_operation(device_id, body).await?;
        }

        Ok(())
    }
}

// ── Document builders ────────────────────────────────────────────────

fn op(class: &str) -> Element {
    Element::new("op").child(Element::text("class", format!("{OP_PACKAGE}.{class}")))
}

fn param(id: &str, obj: Element) -> Element {
    Element::new("param")
        .child(Element::text("id", id))
        .child(obj)
}

fn params_block(epc: Option<&str>, access_password: Option<&str>, params: &TagOpParams) -> Element {
    let mut block = Element::new("params");

    if let Some(epc) = epc.map(str::trim).filter(|e| !e.is_empty()) {
        let filter = Element::new("obj")
            .child(Element::text("class", SELECT_TAG_FILTER))
            .child(Element::text("bank", MemoryBank::Epc.to_string()))
            .child(Element::text("bitPointer", EPC_BIT_POINTER.to_string()))
            .child(Element::text("bitLength", (epc.len() * 4).to_string()))
            .child(Element::text("mask", epc));
        block.push(param("GEN2_FILTER", filter));
    }
    if let Some(antenna) = params.antenna.filter(|&a| a > 0) {
        block.push(param("TAG_OP_ANTENNA", Element::text("obj", antenna.to_string())));
    }
    if params.timeout_ms > 0 {
        block.push(param("TAG_OP_TIMEOUT", Element::text("obj", params.timeout_ms.to_string())));
    }
    if params.write_retries > 0 {
        block.push(param(
            "RF_WRITE_RETRIES",
            Element::text("obj", params.write_retries.to_string()),
        ));
    }
    if let Some(password) = access_password.map(str::trim).filter(|p| !p.is_empty()) {
        block.push(param("GEN2_ACCESS_PASSWORD", Element::text("obj", password)));
    }
    block
}

pub(crate) fn read_data_request(req: &ReadDataRequest<'_>, params: &TagOpParams) -> Element {
    let op = op("ReadDataOp")
        .child(Element::text("bank", req.bank.to_string()))
        .child(Element::text("offset", req.offset.to_string()))
        .child(Element::text("length", req.length.to_string()));
    Element::new("request")
        .child(op)
        .child(params_block(req.epc, req.access_password, params))
}

pub(crate) fn write_data_request(req: &WriteDataRequest<'_>, params: &TagOpParams) -> Element {
    let op = op("WriteDataOp")
        .child(Element::text("bank", req.bank.to_string()))
        .child(Element::text("offset", req.offset.to_string()))
        .child(Element::text("data", req.data));
    Element::new("request")
        .child(op)
        .child(params_block(req.epc, req.access_password, params))
}

/// Commission ops authenticate through their own `accessPwd` field, so the
/// params block carries no password.
fn commission_request(req: &LockTagRequest<'_>, current: &str, params: &TagOpParams) -> Element {
    let mut op = op("CommissionTagOp").child(Element::text("accessPwd", current));
    if let Some(epc) = req.epc {
        op.push(Element::text("epc", epc));
    }
    if let Some(pwd) = req.new_access_password {
        op.push(Element::text("newAccessPwd", pwd));
    }
    if let Some(pwd) = req.new_kill_password {
        op.push(Element::text("newKillPwd", pwd));
    }
    Element::new("request")
        .child(op)
        .child(params_block(req.epc, None, params))
}

fn lock_request(
    epc: Option<&str>,
    access_password: &str,
    lock: &LockOptions,
    params: &TagOpParams,
) -> Element {
    let op = op("LockOp")
        .child(Element::text("accessPwd", format!("0x{access_password}")))
        .child(Element::text("mask", "0"))
        .child(Element::text("action", "0"))
        .child(Element::text("locks", lock.to_locks_string()));
    Element::new("request")
        .child(op)
        .child(params_block(epc, None, params))
}
