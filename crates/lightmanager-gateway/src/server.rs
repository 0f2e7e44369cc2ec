//! TCP server.
//!
//! One listening socket accepts clients for the lifetime of the server. Each
//! connection gets an async task that owns the socket and a session worker
//! thread that runs the (synchronous) command engine:
//!
//! ```text
//!            bytes            LineEvent              SessionEvent
//! socket ──────────► task ──────────────► worker ──────────────────► task ──► socket
//!                  (LineCodec)           (HttpFrontEnd)     Output / Close
//! ```
//!
//! The task is the only writer of its socket. A slow device exchange or a
//! `WAIT` blocks only the worker of the issuing connection. Workers are plain
//! threads, so idle clients never use up the runtime's blocking pool.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lightmanager_metrics::metric_defs;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::engine::{CommandEngine, Outcome};
use crate::http::{is_truncated_http_request, HttpFrontEnd};
use crate::line_codec::{LineCodec, LineEvent};
use crate::output::{OutputSink, PlainSink};
use crate::session::ClientSession;

/// Lines decoded but not yet taken by the worker before reading pauses.
const MAX_PENDING_LINES: usize = 64;

/// Capacity of the worker's line and output channels.
const CHANNEL_CAPACITY: usize = 256;

/// How long open connections get to finish after shutdown was triggered.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How long unread request data is drained after an HTTP response.
const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Shutdown
// ============================================================================

/// Process-wide shutdown signal.
///
/// Triggered by `EXIT` or a termination signal; every accept loop and
/// connection task watches it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Create an untriggered handle.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        ShutdownHandle { tx: Arc::new(tx) }
    }

    /// Request shutdown. Safe to call from any thread, any number of times.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown was requested.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until shutdown is requested.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Connection registry
// ============================================================================

/// An open client connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    /// Remote address.
    pub peer: SocketAddr,
    /// When the connection was accepted.
    pub connected_at: Instant,
}

/// Tracks open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: Mutex<HashMap<u64, ConnectionInfo>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection and return its id.
    pub fn register(&self, peer: SocketAddr) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.lock();
        connections.insert(
            id,
            ConnectionInfo {
                peer,
                connected_at: Instant::now(),
            },
        );
        metrics::counter!(metric_defs::CONNECTIONS_ACCEPTED.name).increment(1);
        metrics::gauge!(metric_defs::CONNECTIONS_ACTIVE.name).set(connections.len() as f64);
        id
    }

    /// Remove a connection. Returns its info if it was registered.
    pub fn unregister(&self, id: u64) -> Option<ConnectionInfo> {
        let mut connections = self.connections.lock();
        let info = connections.remove(&id);
        metrics::gauge!(metric_defs::CONNECTIONS_ACTIVE.name).set(connections.len() as f64);
        info
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether no connection is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remote addresses of all open connections.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.connections.lock().values().map(|info| info.peer).collect()
    }
}

// ============================================================================
// Session worker
// ============================================================================

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `QUIT`.
    Quit,
    /// `EXIT`; the server shuts down.
    Exit,
    /// An HTTP request was answered.
    HttpDone,
    /// Output could not be delivered.
    WriteFailed,
}

/// Messages from the session worker to its connection task.
#[derive(Debug)]
enum SessionEvent {
    Output(Vec<u8>),
    Close(CloseReason),
}

/// `Write` adapter handing output to the connection task.
struct ChannelWriter {
    events: mpsc::Sender<SessionEvent>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.events
            .blocking_send(SessionEvent::Output(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run one client's commands until the connection ends. Blocking.
fn run_session(
    front_end: HttpFrontEnd,
    peer: String,
    mut lines: mpsc::Receiver<LineEvent>,
    events: mpsc::Sender<SessionEvent>,
) {
    let mut session = ClientSession::new(peer);
    let mut sink = PlainSink::new(ChannelWriter {
        events: events.clone(),
    });

    while let Some(event) = lines.blocking_recv() {
        let outcome = match event {
            LineEvent::Line(line) => front_end.execute(&line, &mut session, &mut sink),
            LineEvent::Overlong { length, head, tail } => {
                metrics::counter!(metric_defs::LINES_REJECTED.name, "reason" => "too_long")
                    .increment(1);
                if is_truncated_http_request(&head, &tail) {
                    front_end.reject_oversized(&session, length, &mut sink)
                } else {
                    let max = front_end.engine().config().limits().max_line_length;
                    warn!("{}: dropped {} byte line", session.peer(), length);
                    sink.write_text(&format!(
                        "ERROR - input line too long ({} bytes, at most {})\r\n",
                        length, max
                    ))
                    .map(|_| Outcome::Continue)
                }
            }
        };

        let reason = match outcome {
            Ok(Outcome::Continue) => match sink.write_verbatim(">") {
                Ok(()) => continue,
                Err(_) => CloseReason::WriteFailed,
            },
            Ok(Outcome::Disconnect) => {
                let _ = sink.write_verbatim("bye\r\n");
                CloseReason::Quit
            }
            Ok(Outcome::Shutdown) => {
                let _ = sink.write_verbatim("bye\r\n");
                CloseReason::Exit
            }
            Ok(Outcome::HandledAsHttp) => CloseReason::HttpDone,
            Err(err) => {
                debug!("{}: write failed: {}", session.peer(), err);
                CloseReason::WriteFailed
            }
        };
        let _ = events.blocking_send(SessionEvent::Close(reason));
        return;
    }
}

// ============================================================================
// Connection task
// ============================================================================

async fn reserve(
    tx: &Option<mpsc::Sender<LineEvent>>,
) -> Option<mpsc::Permit<'_, LineEvent>> {
    match tx {
        Some(tx) => tx.reserve().await.ok(),
        None => std::future::pending().await,
    }
}

async fn drain(reader: &mut OwnedReadHalf) {
    let mut buf = [0u8; 1024];
    while let Ok(n) = reader.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
}

/// Serve one client until it quits, fails or the server shuts down.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    front_end: HttpFrontEnd,
    shutdown: ShutdownHandle,
) {
    let max_line_length = front_end.engine().config().limits().max_line_length;
    let (mut reader, mut writer) = stream.into_split();
    let (line_tx, line_rx) = mpsc::channel::<LineEvent>(CHANNEL_CAPACITY);
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(CHANNEL_CAPACITY);

    let label = peer.to_string();
    let worker = std::thread::Builder::new()
        .name(format!("session-{}", peer))
        .spawn(move || run_session(front_end, label, line_rx, event_tx));
    if let Err(err) = worker {
        warn!("{}: cannot start session worker: {}", peer, err);
        return;
    }

    let mut codec = LineCodec::new(max_line_length);
    let mut pending: VecDeque<LineEvent> = VecDeque::new();
    let mut line_tx = Some(line_tx);
    let mut reading = true;
    let mut read_buf = [0u8; 1024];
    let mut reason = None;

    loop {
        if !reading && pending.is_empty() {
            // no more input; the worker ends after the queued lines
            line_tx = None;
        }

        tokio::select! {
            result = reader.read(&mut read_buf), if reading && pending.len() < MAX_PENDING_LINES => {
                match result {
                    Ok(0) => reading = false,
                    Ok(n) => {
                        codec.push(&read_buf[..n]);
                        while let Some(event) = codec.decode() {
                            pending.push_back(event);
                        }
                    }
                    Err(err) => {
                        debug!("{}: read failed: {}", peer, err);
                        break;
                    }
                }
            }

            permit = reserve(&line_tx), if !pending.is_empty() => {
                match permit {
                    Some(permit) => {
                        if let Some(event) = pending.pop_front() {
                            permit.send(event);
                        }
                    }
                    None => {
                        // worker is gone; its remaining output is still queued
                        pending.clear();
                        reading = false;
                    }
                }
            }

            event = event_rx.recv() => {
                match event {
                    Some(SessionEvent::Output(data)) => {
                        if let Err(err) = writer.write_all(&data).await {
                            debug!("{}: write failed: {}", peer, err);
                            break;
                        }
                    }
                    Some(SessionEvent::Close(close)) => {
                        reason = Some(close);
                        break;
                    }
                    None => break,
                }
            }

            _ = shutdown.triggered() => {
                debug!("{}: closing for shutdown", peer);
                break;
            }
        }
    }

    match reason {
        Some(CloseReason::Exit) => {
            info!("{}: EXIT received, shutting down", peer);
            shutdown.trigger();
        }
        Some(CloseReason::HttpDone) => {
            let _ = writer.shutdown().await;
            let _ = tokio::time::timeout(HTTP_DRAIN_TIMEOUT, drain(&mut reader)).await;
        }
        _ => {}
    }
    let _ = writer.shutdown().await;
}

// ============================================================================
// Server
// ============================================================================

/// The TCP command server.
pub struct GatewayServer {
    listener: TcpListener,
    front_end: HttpFrontEnd,
    shutdown: ShutdownHandle,
    registry: Arc<ConnectionRegistry>,
}

impl GatewayServer {
    /// Bind the listening socket.
    pub async fn bind(
        addr: SocketAddr,
        engine: Arc<CommandEngine>,
        shutdown: ShutdownHandle,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {}", listener.local_addr()?);
        Ok(GatewayServer {
            listener,
            front_end: HttpFrontEnd::new(engine),
            shutdown,
            registry: Arc::new(ConnectionRegistry::new()),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The open connections.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// The shutdown signal this server obeys.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept clients until shutdown, then close every connection.
    pub async fn run(self) -> io::Result<()> {
        let GatewayServer {
            listener,
            front_end,
            shutdown,
            registry,
        } = self;
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!("{} connected", peer);
                            let _ = stream.set_nodelay(true);
                            let id = registry.register(peer);
                            let front_end = front_end.clone();
                            let shutdown = shutdown.clone();
                            let registry = registry.clone();
                            tasks.spawn(async move {
                                handle_connection(stream, peer, front_end, shutdown).await;
                                registry.unregister(id);
                                info!("{} disconnected", peer);
                            });
                        }
                        Err(err) => {
                            warn!("accept failed: {}", err);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}

                _ = shutdown.triggered() => break,
            }
        }

        drop(listener);
        info!("stopped accepting, closing {} connection(s)", registry.len());
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("connections did not close in time, aborting");
            tasks.abort_all();
        }
        Ok(())
    }
}
