use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    domain::{null_as_default, Case, DepthTier, ExportBundle, Layer},
    error::ProtocolError,
};

pub const GENERATION_WS_PATH: &str = "/api/ws/generation";
pub const PROVIDERS_PATH: &str = "/api/system/providers";
pub const PARSE_FILE_PATH: &str = "/api/generation/parse-file";

pub const DEFAULT_FEATURE: &str = "Feature";
pub const DEFAULT_PROVIDER: &str = "gigachat";
pub const DEFAULT_PLATFORM: &str = "W";
pub const DEFAULT_PROJECT: &str = "SBER911";
pub const DEFAULT_FOLDER: &str = "Новая ТМ";

/// Logged when the service sends an `error` event without a message.
pub const UNSPECIFIED_FAILURE: &str = "generation service reported an error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub requirement: String,
    pub feature: String,
    pub depth: DepthTier,
    pub provider: String,
    pub platform: String,
}

impl StartRequest {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            feature: DEFAULT_FEATURE.to_string(),
            depth: DepthTier::default(),
            provider: DEFAULT_PROVIDER.to_string(),
            platform: DEFAULT_PLATFORM.to_string(),
        }
    }
}

/// Export settings chosen by the user; the case set and QA text come from the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub project: String,
    pub system: String,
    pub team: String,
    pub ke: bool,
    pub domain: String,
    pub folder: String,
    pub use_llm: bool,
    pub provider: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            system: String::new(),
            team: String::new(),
            ke: false,
            domain: String::new(),
            folder: DEFAULT_FOLDER.to_string(),
            use_llm: false,
            provider: DEFAULT_PROVIDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub cases: Vec<Case>,
    pub qa_doc: String,
    pub project: String,
    pub system: String,
    pub team: String,
    pub ke: bool,
    pub domain: String,
    pub folder: String,
    pub use_llm: bool,
    pub provider: String,
}

impl ExportRequest {
    pub fn new(cases: Vec<Case>, qa_doc: String, options: ExportOptions) -> Self {
        Self {
            cases,
            qa_doc,
            project: options.project,
            system: options.system,
            team: options.team,
            ke: options.ke,
            domain: options.domain,
            folder: options.folder,
            use_llm: options.use_llm,
            provider: options.provider,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    Start(StartRequest),
    Export(ExportRequest),
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Start(_) => "start",
            ClientCommand::Export(_) => "export",
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerDoneData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    LayerStart {
        layer: Layer,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    LayerDone {
        layer: Layer,
        #[serde(default, deserialize_with = "null_as_default")]
        elapsed: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<LayerDoneData>,
    },
    CaseStart {
        #[serde(rename = "i")]
        index: u32,
        total: u32,
        #[serde(default, deserialize_with = "null_as_default")]
        name: String,
    },
    CaseDone {
        case: Case,
    },
    GenerationDone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qa_doc: Option<String>,
    },
    ExportDone(ExportBundle),
    Error {
        #[serde(default = "unspecified_failure", deserialize_with = "message_or_unspecified")]
        message: String,
    },
    /// Any `type` this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::LayerStart { .. } => "layer_start",
            ServerEvent::LayerDone { .. } => "layer_done",
            ServerEvent::CaseStart { .. } => "case_start",
            ServerEvent::CaseDone { .. } => "case_done",
            ServerEvent::GenerationDone { .. } => "generation_done",
            ServerEvent::ExportDone(_) => "export_done",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Unknown => "unknown",
        }
    }
}

fn unspecified_failure() -> String {
    UNSPECIFIED_FAILURE.to_string()
}

fn message_or_unspecified<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let message = Option::<String>::deserialize(deserializer)?;
    Ok(message
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(unspecified_failure))
}

pub fn decode_event(frame: &str) -> Result<ServerEvent, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
