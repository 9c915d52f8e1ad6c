//! mpv JSON IPC client.
//!
//! ```text
//!   MpvDriver::launch()        spawns `mpv --idle`, waits for the socket
//!         │
//!         └── attach(stream)
//!               ├── writer    Request ──► register id in `Pending` ──► socket
//!               └── reader    socket ──► classify()
//!                                          ├── Reply  → waiting caller
//!                                          └── Event  → events channel
//! ```
//!
//! The driver side needs unix domain sockets; `attach` works on any
//! byte stream.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

/// Observer id for `idle-active`, true while nothing is loaded.
pub const OBS_IDLE_ACTIVE: u64 = 1;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const SOCKET_WAIT: Duration = Duration::from_secs(5);
const SOCKET_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum MpvError {
    #[error("mpv binary not found (set MPV_PATH or install mpv)")]
    NotFound,
    #[error("mpv IPC socket {0} did not appear")]
    NoSocket(PathBuf),
    #[error("mpv IPC connection closed")]
    Closed,
    #[error("no reply from mpv to request {0}")]
    Timeout(u64),
    #[error("mpv rejected request {id}: {reason}")]
    Rejected { id: u64, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Unsolicited messages the player task cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MpvEvent {
    Idle(bool),
    EndFile { reason: String },
    Other(String),
}

impl MpvEvent {
    fn parse(msg: &Value) -> Option<Self> {
        let name = msg.get("event")?.as_str()?;
        let event = match name {
            "property-change" => {
                if msg.get("id").and_then(Value::as_u64) != Some(OBS_IDLE_ACTIVE) {
                    return Some(MpvEvent::Other(name.to_string()));
                }
                MpvEvent::Idle(msg.get("data")?.as_bool()?)
            }
            "end-file" => MpvEvent::EndFile {
                reason: msg
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            },
            other => MpvEvent::Other(other.to_string()),
        };
        Some(event)
    }
}

type ReplyTx = oneshot::Sender<Result<(), MpvError>>;
type Pending = Arc<Mutex<HashMap<u64, ReplyTx>>>;

struct Request {
    id: u64,
    line: String,
    reply: ReplyTx,
}

#[derive(Debug)]
enum Incoming {
    Reply { id: u64, result: Result<(), MpvError> },
    Event(MpvEvent),
}

/// Sort one line from mpv into a reply or an event.  `None` for blank,
/// malformed or uninteresting lines.
fn classify(line: &str) -> Option<Incoming> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let msg: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            debug!("mpv: unparseable line {:?}: {}", line, e);
            return None;
        }
    };
    match msg.get("request_id").and_then(Value::as_u64) {
        Some(id) => {
            let status = msg.get("error").and_then(Value::as_str).unwrap_or("missing status");
            let result = if status == "success" {
                Ok(())
            } else {
                Err(MpvError::Rejected {
                    id,
                    reason: status.to_string(),
                })
            };
            Some(Incoming::Reply { id, result })
        }
        None => MpvEvent::parse(&msg).map(Incoming::Event),
    }
}

/// Cloneable sender side of one mpv connection.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<Request>,
    next_id: Arc<AtomicU64>,
}

impl MpvHandle {
    /// Send one command array and wait for mpv to acknowledge it.
    pub async fn command(&self, args: Value) -> Result<(), MpvError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&json!({ "command": args, "request_id": id }))?;
        line.push('\n');

        let (reply, wait) = oneshot::channel();
        self.tx
            .send(Request { id, line, reply })
            .await
            .map_err(|_| MpvError::Closed)?;

        match tokio::time::timeout(REPLY_TIMEOUT, wait).await {
            Err(_) => Err(MpvError::Timeout(id)),
            Ok(Err(_)) => Err(MpvError::Closed),
            Ok(Ok(result)) => result,
        }
    }

    /// Replace whatever is playing with `location`, a path or URL.
    pub async fn load(&self, location: &str) -> Result<(), MpvError> {
        self.command(json!(["loadfile", location, "replace"])).await
    }

    pub async fn stop(&self) -> Result<(), MpvError> {
        self.command(json!(["stop"])).await
    }

    /// Needed once per connection; observers do not survive a reconnect.
    pub async fn observe_idle(&self) -> Result<(), MpvError> {
        self.command(json!(["observe_property", OBS_IDLE_ACTIVE, "idle-active"]))
            .await
    }
}

/// Start the reader and writer tasks for an established connection.
pub fn attach<S>(stream: S, events: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(write_requests(write_half, rx, pending.clone()));
    tokio::spawn(read_messages(BufReader::new(read_half), pending, events));

    MpvHandle {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
    }
}

async fn write_requests<W>(mut writer: W, mut rx: mpsc::Receiver<Request>, pending: Pending)
where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Registered first: the reply can beat `write_all` back.
        pending.lock().await.insert(req.id, req.reply);
        debug!("mpv: -> {}", req.line.trim_end());
        if let Err(e) = writer.write_all(req.line.as_bytes()).await {
            warn!("mpv: write failed: {}", e);
            if let Some(reply) = pending.lock().await.remove(&req.id) {
                let _ = reply.send(Err(MpvError::Io(e)));
            }
            break;
        }
    }
    debug!("mpv: writer finished");
}

async fn read_messages<R>(mut reader: BufReader<R>, pending: Pending, events: mpsc::Sender<MpvEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => match classify(&line) {
                Some(Incoming::Reply { id, result }) => match pending.lock().await.remove(&id) {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => debug!("mpv: reply to unknown request {}", id),
                },
                Some(Incoming::Event(event)) => {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                None => {}
            },
            Err(e) => {
                warn!("mpv: read failed: {}", e);
                break;
            }
        }
    }

    // Whoever is still waiting gets `Closed` instead of a timeout.
    pending.lock().await.clear();
    debug!("mpv: reader finished");
}

/// Owns the mpv child process.  After the process dies, `launch` again.
pub struct MpvDriver {
    socket: PathBuf,
    child: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket: nfc_proto::platform::mpv_socket_path(),
            child: None,
        }
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub async fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }

    /// Start a fresh idle mpv and connect to its IPC socket.
    #[cfg(unix)]
    pub async fn launch(&mut self, events: mpsc::Sender<MpvEvent>) -> Result<MpvHandle, MpvError> {
        self.terminate().await;
        let _ = tokio::fs::remove_file(&self.socket).await;

        let binary = nfc_proto::platform::find_mpv_binary().ok_or(MpvError::NotFound)?;
        info!("mpv: launching {}", binary.display());
        let child = tokio::process::Command::new(binary)
            .args(["--no-video", "--idle=yes", "--quiet"])
            .arg(format!("--input-ipc-server={}", self.socket.display()))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.child = Some(child);

        let deadline = Instant::now() + SOCKET_WAIT;
        let stream = loop {
            tokio::time::sleep(SOCKET_POLL).await;
            match tokio::net::UnixStream::connect(&self.socket).await {
                Ok(stream) => break stream,
                Err(_) if Instant::now() < deadline => continue,
                Err(_) => return Err(MpvError::NoSocket(self.socket.clone())),
            }
        };
        info!("mpv: connected to {}", self.socket.display());

        let handle = attach(stream, events);
        handle.observe_idle().await?;
        Ok(handle)
    }

    #[cfg(not(unix))]
    pub async fn launch(&mut self, _events: mpsc::Sender<MpvEvent>) -> Result<MpvHandle, MpvError> {
        Err(MpvError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "mpv IPC needs unix domain sockets",
        )))
    }
}

impl Default for MpvDriver {
    fn default() -> Self {
        Self::new()
    }
}
