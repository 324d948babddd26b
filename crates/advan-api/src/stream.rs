//! Inventory event stream worker.
//!
//! Connects to the reader's event port, splits the byte stream into frames
//! with [`FrameReader`], decodes each payload into a [`DeviceMessage`] and
//! hands it to an [`EventSink`]. The worker runs until the caller cancels it
//! or the connection fails; there is no automatic reconnect.
//!
//! # Example
//!
//! ```rust,ignore
//! use advan_api::stream::{EventSink, EventStreamHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! let handle = EventStreamHandle::connect("10.0.0.5", 3177, sink, CancellationToken::new()).await?;
//! // ...
//! handle.shutdown();
//! handle.join().await;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::frame::{DEFAULT_MAX_PAYLOAD, FrameReader};
use crate::message::{self, DeviceMessage};

/// Default TCP port of the event stream.
pub const DEFAULT_EVENT_PORT: u16 = 3177;

// ── Sink ─────────────────────────────────────────────────────────────

/// Receiver of decoded stream messages.
///
/// Callbacks run on the worker task, one at a time and in stream order. A
/// slow `on_message` holds back the next frame.
pub trait EventSink: Send + Sync + 'static {
    fn on_message(&self, message: DeviceMessage) -> impl Future<Output = ()> + Send;

    /// The connection ended without being cancelled. `None` means the peer
    /// closed cleanly between frames. Fires at most once per worker.
    fn on_connection_lost(&self, error: Option<Error>);
}

// ── Handle ───────────────────────────────────────────────────────────

/// Handle to a running stream worker.
pub struct EventStreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventStreamHandle {
    /// Open the event socket and spawn the read loop.
    pub async fn connect<S: EventSink>(
        host: &str,
        port: u16,
        sink: Arc<S>,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        Self::connect_with_limit(host, port, DEFAULT_MAX_PAYLOAD, sink, cancel).await
    }

    /// [`connect`](Self::connect) with an explicit frame payload limit.
    pub async fn connect_with_limit<S: EventSink>(
        host: &str,
        port: u16,
        max_payload: usize,
        sink: Arc<S>,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let addr = format!("{host}:{port}");
        info!(%addr, "connecting to event stream");

        let socket = TcpStream::connect(&addr)
            .await
            .map_err(|source| Error::Connect {
                addr: addr.clone(),
                source,
            })?;
        if let Err(e) = socket.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle on event socket");
        }

        info!(%addr, "event stream connected");
        Ok(Self::spawn(
            FrameReader::with_max_payload(socket, max_payload),
            sink,
            cancel,
        ))
    }

    /// Run the read loop over an already-open reader.
    pub fn spawn<R, S>(reader: FrameReader<R>, sink: Arc<S>, cancel: CancellationToken) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        S: EventSink,
    {
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            read_loop(reader, sink, task_cancel).await;
        });
        Self { cancel, task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the worker to stop. Does not fire `on_connection_lost`.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "event stream worker panicked");
        }
    }
}

// ── Read loop ────────────────────────────────────────────────────────

async fn read_loop<R, S>(mut reader: FrameReader<R>, sink: Arc<S>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
    S: EventSink,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("event stream cancelled");
                return;
            }
            frame = reader.next_message() => frame,
        };

        match frame {
            Ok(Some(payload)) => match message::decode(&payload) {
                Ok(Some(msg)) => sink.on_message(msg).await,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "skipping undecodable event payload"),
            },
            Ok(None) => {
                info!("event stream closed by peer");
                sink.on_connection_lost(None);
                return;
            }
            Err(e) => {
                warn!(error = %e, "event stream failed");
                sink.on_connection_lost(Some(e.into()));
                return;
            }
        }
    }
}
