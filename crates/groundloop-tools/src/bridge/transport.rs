//! Newline-delimited JSON-RPC transport.
//!
//! One writer task serialises outbound lines; one reader task routes
//! responses to waiting callers by request id. Concurrent requests are
//! multiplexed over the same stream.

use super::protocol::{
    initialize_params, CallToolResult, InboundMessage, JsonRpcNotification, JsonRpcRequest,
    ListToolsResult, RemoteToolDescriptor,
};
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to spawn tool provider '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to tool provider at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no tool provider configured (set bridge.address or bridge.command)")]
    NotConfigured,

    #[error("tool provider connection closed")]
    Closed,

    #[error("tool provider request timed out after {0:?}")]
    Timeout(Duration),

    #[error("tool provider error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// The two calls a remote tool provider must answer.
#[async_trait::async_trait]
pub trait ToolTransport: Send + Sync {
    async fn list_tools(&self) -> BridgeResult<Vec<RemoteToolDescriptor>>;

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>)
        -> BridgeResult<CallToolResult>;
}

type Pending = Arc<DashMap<i64, oneshot::Sender<BridgeResult<Value>>>>;

pub struct LineTransport {
    write_tx: mpsc::Sender<String>,
    pending: Pending,
    next_id: AtomicI64,
    alive: Arc<AtomicBool>,
    timeout: Duration,
    _child: Option<tokio::sync::Mutex<Child>>,
}

impl LineTransport {
    /// Wrap an already-connected byte stream pair.
    pub fn from_io<R, W>(reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let alive = Arc::new(AtomicBool::new(true));
        let pending: Pending = Arc::new(DashMap::new());

        let (write_tx, mut write_rx) = mpsc::channel::<String>(256);
        let alive_writer = Arc::clone(&alive);
        let mut writer = writer;
        tokio::spawn(async move {
            while let Some(line) = write_rx.recv().await {
                let written = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!("tool provider write error: {}", e);
                    alive_writer.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        let pending_reader = Arc::clone(&pending);
        let alive_reader = Arc::clone(&alive);
        let mut reader = BufReader::new(reader);
        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        route_line(&pending_reader, trimmed);
                    }
                    Err(e) => {
                        warn!("tool provider read error: {}", e);
                        break;
                    }
                }
            }
            alive_reader.store(false, Ordering::SeqCst);
            // Dropping the senders wakes every waiter with `Closed`.
            pending_reader.clear();
        });

        Self {
            write_tx,
            pending,
            next_id: AtomicI64::new(1),
            alive,
            timeout,
            _child: None,
        }
    }

    /// Spawn a provider process and talk to it over stdin/stdout.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> BridgeResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| BridgeError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            BridgeError::Protocol("provider stdin unavailable".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            BridgeError::Protocol("provider stdout unavailable".to_string())
        })?;
        if let Some(stderr) = child.stderr.take() {
            let name = command.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] {}", name, line);
                }
            });
        }

        let mut transport = Self::from_io(stdout, stdin, timeout);
        transport._child = Some(tokio::sync::Mutex::new(child));
        Ok(transport)
    }

    /// Reuse a provider already listening on a TCP address.
    pub async fn connect(address: &str, timeout: Duration) -> BridgeResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| BridgeError::Connect {
                address: address.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            })?
            .map_err(|source| BridgeError::Connect {
                address: address.to_string(),
                source,
            })?;
        let (reader, writer) = stream.into_split();
        Ok(Self::from_io(reader, writer, timeout))
    }

    /// `initialize` handshake followed by the `notifications/initialized` notice.
    pub async fn initialize(&self) -> BridgeResult<Value> {
        let result = self.request("initialize", Some(initialize_params())).await?;
        self.notify("notifications/initialized", Some(json!({})))
            .await?;
        Ok(result)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> BridgeResult<()> {
        if !self.is_alive() {
            return Err(BridgeError::Closed);
        }
        let line = format!(
            "{}\n",
            serde_json::to_string(&JsonRpcNotification::new(method, params))?
        );
        self.write_tx
            .send(line)
            .await
            .map_err(|_| BridgeError::Closed)
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> BridgeResult<Value> {
        if !self.is_alive() {
            return Err(BridgeError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = format!(
            "{}\n",
            serde_json::to_string(&JsonRpcRequest::new(id, method, params))?
        );

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        // The reader clears `pending` after flagging the stream dead; checking
        // again here means an entry inserted too late is never stranded.
        if !self.is_alive() {
            self.pending.remove(&id);
            return Err(BridgeError::Closed);
        }

        if self.write_tx.send(line).await.is_err() {
            self.pending.remove(&id);
            return Err(BridgeError::Closed);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                Err(BridgeError::Timeout(self.timeout))
            }
        }
    }
}

fn route_line(pending: &Pending, line: &str) {
    let message: InboundMessage = match serde_json::from_str(line) {
        Ok(m) => m,
        Err(e) => {
            debug!("ignoring unparsable provider line ({}): {}", e, line);
            return;
        }
    };
    let Some(id) = message.response_id() else {
        debug!("ignoring provider message: {}", line);
        return;
    };
    let Some((_, tx)) = pending.remove(&id) else {
        debug!("response for unknown request id {}", id);
        return;
    };

    let result = match (message.error, message.result) {
        (Some(error), _) => Err(BridgeError::Remote {
            code: error.code,
            message: error.message,
        }),
        (None, Some(result)) => Ok(result),
        (None, None) => Ok(Value::Null),
    };
    let _ = tx.send(result);
}

#[async_trait::async_trait]
impl ToolTransport for LineTransport {
    async fn list_tools(&self) -> BridgeResult<Vec<RemoteToolDescriptor>> {
        let result = self.request("tools/list", Some(json!({}))).await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        let list: ListToolsResult = serde_json::from_value(result)?;
        Ok(list.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> BridgeResult<CallToolResult> {
        let result = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        serde_json::from_value(result).map_err(BridgeError::from)
    }
}
