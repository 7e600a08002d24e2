use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{Case, ExportBundle, Progress},
    protocol::{decode_event, ClientCommand, ExportOptions, ExportRequest, StartRequest},
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use url::Url;

pub mod config;
pub mod connection;
pub mod error;
pub mod session;
pub mod system_api;

pub use config::{generation_endpoint, load_settings, ClientSettings};
pub use connection::{ConnectionId, ConnectionManager};
pub use error::ClientError;
pub use session::{GenerationState, Session, SessionChange, SessionEvent};
pub use system_api::{HealthColor, ParsedFile, ProviderStatus, SystemApi};

use connection::{Inbound, InboundFrame};

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientEvent {
    pub state: GenerationState,
    pub change: SessionChange,
}

/// Point-in-time copy of every observable of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: GenerationState,
    pub events: Vec<SessionEvent>,
    pub progress: Option<Progress>,
    pub cases: Vec<Case>,
    pub qa_doc: String,
    pub export_result: Option<ExportBundle>,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            state: session.state(),
            events: session.events().to_vec(),
            progress: session.progress().cloned(),
            cases: session.cases().to_vec(),
            qa_doc: session.qa_doc().to_string(),
            export_result: session.export_result().cloned(),
        }
    }
}

#[async_trait]
pub trait GenerationHandle: Send + Sync {
    async fn start(&self, request: StartRequest) -> Result<(), ClientError>;
    async fn export(&self, options: ExportOptions) -> Result<(), ClientError>;
    async fn reset(&self);
    async fn snapshot(&self) -> SessionSnapshot;
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

struct SessionSlot {
    session: Session,
    /// Frames from any other connection are dropped.
    bound: Option<ConnectionId>,
    /// Bumped by `start` and `reset`; a command issued under an older epoch
    /// must not bind its connection.
    epoch: u64,
}

struct SessionCell {
    slot: Mutex<SessionSlot>,
    events: broadcast::Sender<ClientEvent>,
}

impl SessionCell {
    fn publish(&self, state: GenerationState, change: SessionChange) {
        let _ = self.events.send(ClientEvent { state, change });
    }
}

/// Drives one generation session over one WebSocket connection.
///
/// Must be created inside a tokio runtime: construction spawns the task that
/// applies inbound frames to the session.
pub struct GenerationClient {
    connection: ConnectionManager,
    cell: Arc<SessionCell>,
    dispatch_task: JoinHandle<()>,
}

impl GenerationClient {
    pub fn new(settings: &ClientSettings) -> Result<Arc<Self>, ClientError> {
        Ok(Self::with_endpoint(generation_endpoint(&settings.base_url)?))
    }

    pub fn with_endpoint(endpoint: Url) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let cell = Arc::new(SessionCell {
            slot: Mutex::new(SessionSlot {
                session: Session::new(),
                bound: None,
                epoch: 0,
            }),
            events,
        });
        let dispatch_task = tokio::spawn(dispatch_inbound(Arc::clone(&cell), inbound_rx));

        Arc::new(Self {
            connection: ConnectionManager::new(endpoint, inbound_tx),
            cell,
            dispatch_task,
        })
    }

    pub fn endpoint(&self) -> &Url {
        self.connection.endpoint()
    }

    pub async fn start(&self, request: StartRequest) -> Result<(), ClientError> {
        let epoch = {
            let mut slot = self.cell.slot.lock().await;
            slot.bound = None;
            slot.epoch += 1;
            let change = slot.session.begin();
            self.cell.publish(slot.session.state(), change);
            slot.epoch
        };
        self.connection.teardown().await;
        info!(
            depth = %request.depth,
            provider = %request.provider,
            platform = %request.platform,
            "session: starting generation"
        );
        self.send_bound(ClientCommand::Start(request), epoch).await
    }

    /// Sends the accumulated cases and QA text for export, reusing the open
    /// connection when there is one. Never clears what the session holds.
    pub async fn export(&self, options: ExportOptions) -> Result<(), ClientError> {
        let (request, epoch) = {
            let mut slot = self.cell.slot.lock().await;
            if slot.session.cases().is_empty() {
                return Err(ClientError::NothingToExport);
            }
            if slot.session.awaiting_export() {
                debug!("export: replacing a request that has not been answered yet");
            }
            slot.session.mark_export_requested();
            let request = ExportRequest::new(
                slot.session.cases().to_vec(),
                slot.session.qa_doc().to_string(),
                options,
            );
            (request, slot.epoch)
        };
        info!(
            cases = request.cases.len(),
            use_llm = request.use_llm,
            "export: requesting bundle"
        );
        self.send_bound(ClientCommand::Export(request), epoch).await
    }

    /// Drops the connection and returns the session to an empty `idle`.
    pub async fn reset(&self) {
        {
            let mut slot = self.cell.slot.lock().await;
            slot.bound = None;
            slot.epoch += 1;
            let change = slot.session.reset();
            self.cell.publish(slot.session.state(), change);
        }
        self.connection.teardown().await;
        debug!("session: reset");
    }

    pub async fn state(&self) -> GenerationState {
        self.cell.slot.lock().await.session.state()
    }

    pub async fn events(&self) -> Vec<SessionEvent> {
        self.cell.slot.lock().await.session.events().to_vec()
    }

    pub async fn progress(&self) -> Option<Progress> {
        self.cell.slot.lock().await.session.progress().cloned()
    }

    pub async fn cases(&self) -> Vec<Case> {
        self.cell.slot.lock().await.session.cases().to_vec()
    }

    pub async fn qa_doc(&self) -> String {
        self.cell.slot.lock().await.session.qa_doc().to_string()
    }

    pub async fn export_result(&self) -> Option<ExportBundle> {
        self.cell.slot.lock().await.session.export_result().cloned()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&self.cell.slot.lock().await.session)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.cell.events.subscribe()
    }

    async fn send_bound(&self, command: ClientCommand, epoch: u64) -> Result<(), ClientError> {
        let mut lease = match self.connection.acquire().await {
            Ok(lease) => lease,
            Err(err) => {
                self.fail_delivery(&err, epoch).await;
                return Err(err);
            }
        };

        {
            let mut slot = self.cell.slot.lock().await;
            if slot.epoch != epoch {
                debug!(command = command.name(), "session: command superseded before send");
                return Err(ClientError::Superseded);
            }
            slot.bound = Some(lease.id());
        }

        if let Err(err) = lease.send(&command).await {
            drop(lease);
            self.fail_delivery(&err, epoch).await;
            return Err(err);
        }
        Ok(())
    }

    async fn fail_delivery(&self, err: &ClientError, epoch: u64) {
        let mut slot = self.cell.slot.lock().await;
        if slot.epoch != epoch {
            return;
        }
        let change = slot.session.connection_failed(err.to_string());
        self.cell.publish(slot.session.state(), change);
    }

    #[cfg(test)]
    pub(crate) fn inbound_for_tests(&self) -> mpsc::UnboundedSender<Inbound> {
        self.connection.inbound_sender()
    }

    #[cfg(test)]
    pub(crate) async fn bound_connection(&self) -> Option<ConnectionId> {
        self.cell.slot.lock().await.bound
    }
}

impl Drop for GenerationClient {
    fn drop(&mut self) {
        self.dispatch_task.abort();
    }
}

/// Single consumer of every connection's frames. Applies them in arrival order
/// and discards frames that do not belong to the bound connection.
async fn dispatch_inbound(cell: Arc<SessionCell>, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(Inbound { connection, frame }) = inbound.recv().await {
        let mut slot = cell.slot.lock().await;
        if slot.bound != Some(connection) {
            debug!(connection_id = connection.0, "ws: dropping frame from unbound connection");
            continue;
        }

        let change = match frame {
            InboundFrame::Text(text) => match decode_event(&text) {
                Ok(event) => {
                    debug!(connection_id = connection.0, kind = event.kind(), "ws: event received");
                    slot.session.apply(event)
                }
                Err(err) => {
                    warn!(connection_id = connection.0, "ws: ignoring frame: {err}");
                    None
                }
            },
            InboundFrame::Dropped(reason) => {
                slot.bound = None;
                slot.session.transport_lost(reason)
            }
        };

        if let Some(change) = change {
            cell.publish(slot.session.state(), change);
        }
    }
}

#[async_trait]
impl GenerationHandle for Arc<GenerationClient> {
    async fn start(&self, request: StartRequest) -> Result<(), ClientError> {
        GenerationClient::start(self, request).await
    }

    async fn export(&self, options: ExportOptions) -> Result<(), ClientError> {
        GenerationClient::export(self, options).await
    }

    async fn reset(&self) {
        GenerationClient::reset(self).await
    }

    async fn snapshot(&self) -> SessionSnapshot {
        GenerationClient::snapshot(self).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        GenerationClient::subscribe_events(self)
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
