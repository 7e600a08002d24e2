//! REST collaborators of the generation service: provider health and
//! requirement-file text extraction.

use std::path::Path;

use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;
use shared::protocol::{PARSE_FILE_PATH, PROVIDERS_PATH};
use tracing::info;

use crate::{config::rest_endpoint, error::ClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthColor {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderStatus {
    pub id: String,
    pub name: String,
    pub status: HealthColor,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParsedFile {
    pub text: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
}

pub struct SystemApi {
    http: Client,
    base_url: String,
}

impl SystemApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn providers(&self) -> Result<Vec<ProviderStatus>, ClientError> {
        let url = rest_endpoint(&self.base_url, PROVIDERS_PATH)?;
        let providers = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(providers)
    }

    /// Uploads a requirement document and returns the text the service extracted.
    pub async fn parse_file(&self, path: &Path) -> Result<ParsedFile, ClientError> {
        let url = rest_endpoint(&self.base_url, PARSE_FILE_PATH)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "requirement.txt".to_string());
        info!(filename = %filename, size = bytes.len(), "parse-file: uploading");

        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename));
        let parsed = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parsed)
    }
}

#[cfg(test)]
#[path = "tests/system_api_tests.rs"]
mod tests;
