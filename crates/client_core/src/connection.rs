//! Lazily opened WebSocket to the generation endpoint.
//!
//! One [`ConnectionManager`] owns at most one live socket. Each socket gets a
//! fresh [`ConnectionId`]; its reader task tags every inbound frame with that id
//! so the consumer can drop frames from a connection it no longer listens to.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::protocol::ClientCommand;
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex, MutexGuard},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Upper bound on the TCP connect plus WebSocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    /// The socket closed or failed; no further frames follow for this id.
    Dropped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub connection: ConnectionId,
    pub frame: InboundFrame,
}

struct ActiveConnection {
    id: ConnectionId,
    writer: WsWriter,
    open: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
}

impl ActiveConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

pub struct ConnectionManager {
    endpoint: Url,
    inbound: mpsc::UnboundedSender<Inbound>,
    next_id: AtomicU64,
    connect_timeout: Duration,
    active: Mutex<Option<ActiveConnection>>,
}

impl ConnectionManager {
    pub fn new(endpoint: Url, inbound: mpsc::UnboundedSender<Inbound>) -> Self {
        Self {
            endpoint,
            inbound,
            next_id: AtomicU64::new(1),
            connect_timeout: CONNECT_TIMEOUT,
            active: Mutex::new(None),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns a lease on the open connection, opening one first if needed.
    ///
    /// The lease holds the manager lock, so a concurrent caller waits for this
    /// handshake and then reuses its result instead of dialing again.
    pub async fn acquire(&self) -> Result<ConnectionLease<'_>, ClientError> {
        let mut guard = self.active.lock().await;

        let reusable = guard.as_ref().filter(|conn| conn.is_open()).map(|conn| conn.id);
        let id = match reusable {
            Some(id) => {
                debug!(connection_id = id.0, "ws: reusing open connection");
                id
            }
            None => {
                if let Some(stale) = guard.take() {
                    debug!(connection_id = stale.id.0, "ws: discarding closed connection");
                }
                let conn = self.open().await?;
                let id = conn.id;
                *guard = Some(conn);
                id
            }
        };

        Ok(ConnectionLease { id, guard })
    }

    /// Closes the live connection, if any. The next `acquire` dials fresh.
    pub async fn teardown(&self) {
        let Some(mut conn) = self.active.lock().await.take() else {
            return;
        };
        conn.open.store(false, Ordering::Release);
        conn.reader_task.abort();
        if let Err(err) = conn.writer.close().await {
            debug!(connection_id = conn.id.0, "ws: close handshake failed: {err}");
        }
        info!(connection_id = conn.id.0, "ws: connection torn down");
    }

    #[cfg(test)]
    pub(crate) fn inbound_sender(&self) -> mpsc::UnboundedSender<Inbound> {
        self.inbound.clone()
    }

    pub async fn is_open(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(ActiveConnection::is_open)
    }

    async fn open(&self) -> Result<ActiveConnection, ClientError> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handshake = connect_async(self.endpoint.as_str());
        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| {
                warn!(connection_id = id.0, endpoint = %self.endpoint, "ws: handshake timed out");
                ClientError::ConnectTimeout {
                    endpoint: self.endpoint.to_string(),
                    after: self.connect_timeout,
                }
            })?
            .map_err(|source| ClientError::Connect {
                endpoint: self.endpoint.to_string(),
                source,
            })?;
        info!(connection_id = id.0, endpoint = %self.endpoint, "ws: connected");

        let (writer, reader) = ws_stream.split();
        let open = Arc::new(AtomicBool::new(true));
        let reader_task = tokio::spawn(read_frames(
            id,
            reader,
            Arc::clone(&open),
            self.inbound.clone(),
        ));

        Ok(ActiveConnection {
            id,
            writer,
            open,
            reader_task,
        })
    }
}

async fn read_frames(
    id: ConnectionId,
    mut reader: futures::stream::SplitStream<WsStream>,
    open: Arc<AtomicBool>,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    let reason = loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame = Inbound {
                    connection: id,
                    frame: InboundFrame::Text(text),
                };
                if inbound.send(frame).is_err() {
                    open.store(false, Ordering::Release);
                    return;
                }
            }
            Some(Ok(Message::Close(_))) | None => break "connection closed by server".to_string(),
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(connection_id = id.0, "ws: receive failed: {err}");
                break format!("websocket receive failed: {err}");
            }
        }
    };

    open.store(false, Ordering::Release);
    let _ = inbound.send(Inbound {
        connection: id,
        frame: InboundFrame::Dropped(reason),
    });
}

/// Exclusive access to an open connection; commands sent through one lease
/// go out in call order.
pub struct ConnectionLease<'a> {
    id: ConnectionId,
    guard: MutexGuard<'a, Option<ActiveConnection>>,
}

impl ConnectionLease<'_> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn send(&mut self, command: &ClientCommand) -> Result<(), ClientError> {
        let payload = command.to_json()?;
        let Some(conn) = self.guard.as_mut().filter(|conn| conn.id == self.id) else {
            return Err(ClientError::NotConnected);
        };
        if let Err(err) = conn.writer.send(Message::Text(payload)).await {
            conn.open.store(false, Ordering::Release);
            return Err(ClientError::Send(err));
        }
        debug!(
            connection_id = self.id.0,
            command = command.name(),
            "ws: command sent"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
