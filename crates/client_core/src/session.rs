//! Generation session state and the reducer that folds service events into it.

use shared::{
    domain::{Case, ExportBundle, Layer, Progress},
    error::FailureOrigin,
    protocol::ServerEvent,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    Generating,
    Done,
    Error,
}

impl GenerationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationState::Done | GenerationState::Error)
    }
}

/// Entry of the session's status log.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LayerStart {
        layer: Layer,
        name: Option<String>,
    },
    LayerDone {
        layer: Layer,
        elapsed: f64,
        count: Option<u32>,
    },
    Error {
        origin: FailureOrigin,
        message: String,
    },
}

/// What a single reducer step changed, for subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    Started,
    Logged(SessionEvent),
    Progress(Progress),
    CaseAdded { index: usize, name: String },
    Finished { cases: usize },
    ExportReady,
    Failed { origin: FailureOrigin, message: String },
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    state: GenerationState,
    events: Vec<SessionEvent>,
    progress: Option<Progress>,
    cases: Vec<Case>,
    qa_doc: String,
    export: Option<ExportBundle>,
    awaiting_export: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GenerationState {
        self.state
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn qa_doc(&self) -> &str {
        &self.qa_doc
    }

    pub fn export_result(&self) -> Option<&ExportBundle> {
        self.export.as_ref()
    }

    pub fn awaiting_export(&self) -> bool {
        self.awaiting_export
    }

    /// Empties the session and returns it to `idle`.
    pub fn reset(&mut self) -> SessionChange {
        *self = Session::default();
        SessionChange::Reset
    }

    /// Empties the session and enters `generating` for a new `start`.
    pub fn begin(&mut self) -> SessionChange {
        *self = Session {
            state: GenerationState::Generating,
            ..Session::default()
        };
        SessionChange::Started
    }

    pub fn mark_export_requested(&mut self) {
        self.awaiting_export = true;
    }

    /// Applies one service event. `None` means the event changed nothing.
    pub fn apply(&mut self, event: ServerEvent) -> Option<SessionChange> {
        match event {
            ServerEvent::LayerStart { layer, name } => {
                debug!(layer = layer.0, "session: layer started");
                let entry = SessionEvent::LayerStart { layer, name };
                self.events.push(entry.clone());
                Some(SessionChange::Logged(entry))
            }
            ServerEvent::LayerDone {
                layer,
                elapsed,
                data,
            } => {
                let data = data.unwrap_or_default();
                if layer == Layer::QA_DOC {
                    if let Some(qa_doc) = data.qa_doc {
                        self.qa_doc = qa_doc;
                    }
                }
                debug!(layer = layer.0, elapsed, "session: layer finished");
                let entry = SessionEvent::LayerDone {
                    layer,
                    elapsed,
                    count: data.count,
                };
                self.events.push(entry.clone());
                Some(SessionChange::Logged(entry))
            }
            ServerEvent::CaseStart { index, total, name } => {
                let progress = Progress {
                    current: index,
                    total,
                    name,
                };
                self.progress = Some(progress.clone());
                Some(SessionChange::Progress(progress))
            }
            ServerEvent::CaseDone { case } => {
                let name = case.name.clone();
                self.cases.push(case);
                Some(SessionChange::CaseAdded {
                    index: self.cases.len(),
                    name,
                })
            }
            ServerEvent::GenerationDone { qa_doc } => {
                self.progress = None;
                if let Some(qa_doc) = qa_doc {
                    self.qa_doc = qa_doc;
                }
                if self.state == GenerationState::Generating {
                    self.state = GenerationState::Done;
                    info!(cases = self.cases.len(), "session: generation finished");
                } else {
                    warn!(state = ?self.state, "session: generation_done outside of a running generation");
                }
                Some(SessionChange::Finished {
                    cases: self.cases.len(),
                })
            }
            ServerEvent::ExportDone(bundle) => {
                self.export = Some(bundle);
                self.awaiting_export = false;
                info!("export: bundle received");
                Some(SessionChange::ExportReady)
            }
            ServerEvent::Error { message } => {
                Some(self.record_failure(FailureOrigin::Service, message))
            }
            ServerEvent::Unknown => {
                debug!("session: ignoring unknown event type");
                None
            }
        }
    }

    /// A command could not be delivered: the connection failed to open or send.
    pub fn connection_failed(&mut self, message: impl Into<String>) -> SessionChange {
        self.record_failure(FailureOrigin::Connection, message.into())
    }

    /// The bound connection dropped. Only matters while something is in flight.
    pub fn transport_lost(&mut self, reason: impl Into<String>) -> Option<SessionChange> {
        if self.state == GenerationState::Generating || self.awaiting_export {
            Some(self.record_failure(FailureOrigin::Connection, reason.into()))
        } else {
            debug!("session: connection dropped while idle");
            None
        }
    }

    fn record_failure(&mut self, origin: FailureOrigin, message: String) -> SessionChange {
        self.awaiting_export = false;
        self.events.push(SessionEvent::Error {
            origin,
            message: message.clone(),
        });
        if self.state == GenerationState::Generating {
            self.state = GenerationState::Error;
        }
        warn!(?origin, state = ?self.state, "session: {message}");
        SessionChange::Failed { origin, message }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
