//! RPC client state machine.
//!
//! Composes the supervisor, the line codec, and the request registry into
//! the public connect/disconnect/request surface. Per connection the client
//! runs four background tasks tied to one [`CancellationToken`]:
//!
//! - **writer** — drains the outbound queue into the worker's stdin;
//! - **reader** — frames stdout into lines and dispatches responses to the
//!   registry;
//! - **exit monitor** — awaits process exit (from [`supervisor`]);
//! - **stderr drain** — routes diagnostics to logging (from [`supervisor`]).
//!
//! States: Disconnected → Connecting → Connected → Disconnected. A later
//! `connect()` starts a fresh cycle with a fresh worker, registry, and id
//! space. Any process exit or transport failure drains every pending
//! request with [`ClientError::ConnectionLost`]; nothing is left pending
//! past teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::process::ChildStdin;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::LineCodec;
use crate::config::ClientConfig;
use crate::protocol::{classify_line, JsonRpcRequest};
use crate::registry::RequestRegistry;
use crate::supervisor::{self, WorkerExit};
use crate::{ClientError, Result};

/// Depth of the outbound write queue before `request()` callers backpressure.
const WRITER_QUEUE_DEPTH: usize = 64;

// ── State ────────────────────────────────────────────────────────────────────

/// Connection lifecycle state.
#[derive(Debug)]
enum State {
    Disconnected,
    Connecting,
    Connected(ConnectionState),
}

/// Per-connection handles shared between `request()` and the I/O tasks.
#[derive(Debug, Clone)]
struct ConnectionState {
    registry: RequestRegistry,
    writer_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    pid: u32,
}

/// State shared between the client handle and its background tasks.
#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    alive: AtomicBool,
}

// ── RpcClient ────────────────────────────────────────────────────────────────

/// Client endpoint of the worker's JSON-RPC stdio protocol.
///
/// Cheaply clonable; clones share the same connection. One worker process
/// and one registry exist per connected client at a time.
#[derive(Debug, Clone)]
pub struct RpcClient {
    config: ClientConfig,
    shared: Arc<Shared>,
}

impl RpcClient {
    /// Create a disconnected client from validated configuration.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(State::Disconnected),
                alive: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the worker and bring the connection up.
    ///
    /// Launches the worker with the fixed argument contract, waits for its
    /// ready signal, wires the reader/writer/monitor tasks, and declares
    /// the client Connected.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Launch`] — already connected, spawn failure, or no
    ///   ready signal within the startup window. The client returns to
    ///   Disconnected and may retry.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().await;
            if !matches!(*state, State::Disconnected) {
                return Err(ClientError::Launch("client already connected".into()));
            }
            *state = State::Connecting;
        }

        let conn = match supervisor::spawn_worker(&self.config.spawn_config()).await {
            Ok(conn) => conn,
            Err(err) => {
                *self.shared.state.lock().await = State::Disconnected;
                return Err(err);
            }
        };

        let pid = conn.pid;
        let registry = RequestRegistry::new();
        let cancel = CancellationToken::new();
        let (writer_tx, writer_rx) = mpsc::channel(WRITER_QUEUE_DEPTH);
        let (exit_tx, exit_rx) = mpsc::channel(1);

        // Declare Connected before starting the I/O tasks so that a worker
        // dying immediately is observed by a task that can tear down the
        // Connected state, not race an in-progress transition.
        {
            let mut state = self.shared.state.lock().await;
            *state = State::Connected(ConnectionState {
                registry: registry.clone(),
                writer_tx,
                cancel: cancel.clone(),
                pid,
            });
            self.shared.alive.store(true, Ordering::Release);
        }

        tokio::spawn(run_writer(
            pid,
            conn.stdin,
            writer_rx,
            cancel.clone(),
            Arc::clone(&self.shared),
        ));
        tokio::spawn(run_reader(
            pid,
            conn.stdout,
            registry,
            cancel.clone(),
            Arc::clone(&self.shared),
        ));
        let _monitor = supervisor::monitor_exit(pid, conn.child, exit_tx, cancel.clone());
        let _drain = supervisor::drain_stderr(pid, conn.stderr, cancel);
        tokio::spawn(watch_exit(pid, exit_rx, Arc::clone(&self.shared)));

        info!(pid, "connected to worker");
        Ok(())
    }

    /// Issue a request and await its terminal outcome.
    ///
    /// Valid only while Connected. Allocates a fresh correlation id,
    /// registers the pending entry with the configured timeout, writes the
    /// encoded line, and suspends only this caller until the id resolves,
    /// rejects, times out, or the connection drains. Concurrent callers
    /// never block each other.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] — issued outside the Connected state.
    /// - [`ClientError::Rpc`] — the worker returned an error response.
    /// - [`ClientError::Timeout`] — no response before the deadline; the
    ///   connection remains usable for other requests.
    /// - [`ClientError::ConnectionLost`] — the worker exited or the
    ///   transport failed while this request was outstanding.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let conn = {
            let state = self.shared.state.lock().await;
            match &*state {
                State::Connected(conn) if self.shared.alive.load(Ordering::Acquire) => {
                    conn.clone()
                }
                _ => return Err(ClientError::NotConnected),
            }
        };

        let id = conn.registry.next_id();
        let line = JsonRpcRequest::new(id, method, params).encode()?;
        let rx = conn
            .registry
            .register(id, method, self.config.request_timeout())
            .await;

        debug!(id, method, pid = conn.pid, "request issued");

        if conn.writer_tx.send(line).await.is_err() {
            // Writer already torn down; make sure our own entry terminates.
            conn.registry
                .reject(id, ClientError::ConnectionLost("write channel closed".into()))
                .await;
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::ConnectionLost(
                "request dropped during teardown".into(),
            )),
        }
    }

    /// Tear the connection down; safe to call repeatedly.
    ///
    /// Cancels the I/O tasks (which kills the worker process), drains every
    /// pending request with a connection-closed error, and returns the
    /// client to Disconnected. A no-op when already disconnected.
    pub async fn disconnect(&self) {
        teardown(
            &self.shared,
            &ClientError::ConnectionLost("connection closed: client disconnect".into()),
        )
        .await;
    }

    /// `true` iff the state machine is Connected and the worker process is
    /// still alive. Flips to `false` the moment exit or transport failure
    /// is observed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    /// Number of requests currently awaiting a response.
    pub async fn pending_requests(&self) -> usize {
        let state = self.shared.state.lock().await;
        match &*state {
            State::Connected(conn) => conn.registry.pending_count().await,
            _ => 0,
        }
    }
}

// ── Teardown ─────────────────────────────────────────────────────────────────

/// Move the client to Disconnected and drain every pending request with
/// `error`. Idempotent: only the caller that actually removes the
/// Connected state performs the drain.
async fn teardown(shared: &Arc<Shared>, error: &ClientError) {
    let conn = {
        let mut state = shared.state.lock().await;
        if matches!(*state, State::Connected(_)) {
            match std::mem::replace(&mut *state, State::Disconnected) {
                State::Connected(conn) => Some(conn),
                _ => None,
            }
        } else {
            // Disconnected or mid-connect: nothing is registered yet and
            // the connect path owns the state transition.
            None
        }
    };

    shared.alive.store(false, Ordering::Release);

    if let Some(conn) = conn {
        info!(pid = conn.pid, %error, "connection torn down");
        conn.cancel.cancel();
        conn.registry.drain_all(error).await;
    }
}

// ── Writer task ──────────────────────────────────────────────────────────────

/// Drain encoded request lines from `line_rx` into the worker's stdin
/// through a [`FramedWrite`] with the line codec, which appends the `\n`
/// delimiter and flushes per line. A failed write means the worker is
/// gone; the task tears the connection down and exits.
async fn run_writer(
    pid: u32,
    stdin: ChildStdin,
    mut line_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
) {
    let mut framed = FramedWrite::new(stdin, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(pid, "writer: cancellation received, stopping");
                break;
            }

            line = line_rx.recv() => {
                let Some(line) = line else {
                    debug!(pid, "writer: request channel closed, stopping");
                    break;
                };

                if let Err(err) = framed.send(line).await {
                    warn!(pid, %err, "writer: write to worker stdin failed");
                    teardown(
                        &shared,
                        &ClientError::ConnectionLost(format!("write failed: {err}")),
                    )
                    .await;
                    break;
                }
            }
        }
    }
}

// ── Reader task ──────────────────────────────────────────────────────────────

/// Frame the worker's stdout into lines and dispatch each to the registry.
///
/// Malformed and oversized lines are handled upstream: the codec discards
/// oversized lines itself and `dispatch_line` drops undecodable ones, so
/// neither tears the stream down. EOF and I/O errors terminate the
/// connection with `ConnectionLost`.
async fn run_reader<R>(
    pid: u32,
    stdout: R,
    registry: RequestRegistry,
    cancel: CancellationToken,
    shared: Arc<Shared>,
) where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(pid, "reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(pid, "reader: EOF on worker stdout");
                        teardown(
                            &shared,
                            &ClientError::ConnectionLost("worker stdout closed".into()),
                        )
                        .await;
                        break;
                    }

                    Some(Err(err)) => {
                        warn!(pid, %err, "reader: stream error, stopping");
                        teardown(
                            &shared,
                            &ClientError::ConnectionLost(format!("stream error: {err}")),
                        )
                        .await;
                        break;
                    }

                    Some(Ok(line)) => {
                        dispatch_line(pid, &registry, &line).await;
                    }
                }
            }
        }
    }
}

/// Route one decoded line: responses complete their pending entry, error
/// responses reject it, non-protocol lines are logged and dropped.
async fn dispatch_line(pid: u32, registry: &RequestRegistry, line: &str) {
    match classify_line(line) {
        Ok(Some(response)) => match response.error {
            Some(rpc_err) => {
                registry.reject(response.id, ClientError::Rpc(rpc_err)).await;
            }
            None => {
                registry
                    .resolve(response.id, response.result.unwrap_or(Value::Null))
                    .await;
            }
        },
        Ok(None) => {
            debug!(pid, raw_line = line, "reader: non-protocol line ignored");
        }
        Err(err) => {
            // Malformed JSON is tolerated diagnostic text; log and discard.
            warn!(pid, %err, raw_line = line, "reader: undecodable line discarded");
        }
    }
}

// ── Exit watcher ─────────────────────────────────────────────────────────────

/// Await the worker's exit report and drain the connection when it arrives.
async fn watch_exit(pid: u32, mut exit_rx: mpsc::Receiver<WorkerExit>, shared: Arc<Shared>) {
    if let Some(exit) = exit_rx.recv().await {
        warn!(pid, code = ?exit.code, reason = exit.reason.as_str(), "worker exited");
        teardown(&shared, &ClientError::ConnectionLost(exit.reason)).await;
    }
}
