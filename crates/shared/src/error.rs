use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a logged failure came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    /// The transport failed to open, failed to send, or dropped.
    Connection,
    /// The generation service reported an `error` event.
    Service,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed event frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown depth tier `{0}` (expected smoke, regression, full or atomary)")]
pub struct UnknownDepthTier(pub String);
