use std::{path::PathBuf, time::Duration};

use shared::error::ProtocolError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("websocket connection failed: {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("websocket handshake with {endpoint} timed out after {after:?}")]
    ConnectTimeout { endpoint: String, after: Duration },
    #[error("websocket send failed: {0}")]
    Send(#[source] tungstenite::Error),
    #[error("websocket connection is not open")]
    NotConnected,
    #[error("failed to encode command: {0}")]
    Encode(#[from] ProtocolError),
    #[error("nothing to export: the case list is empty")]
    NothingToExport,
    #[error("command dropped: a newer start or reset superseded it before it was sent")]
    Superseded,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// True for failures of the generation transport itself.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. }
                | ClientError::ConnectTimeout { .. }
                | ClientError::Send(_)
                | ClientError::NotConnected
        )
    }
}
