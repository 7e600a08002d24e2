use std::{collections::HashMap, fs, path::Path};

use shared::{
    domain::DepthTier,
    protocol::{
        DEFAULT_FEATURE, DEFAULT_FOLDER, DEFAULT_PLATFORM, DEFAULT_PROJECT, DEFAULT_PROVIDER,
        GENERATION_WS_PATH,
    },
};
use tracing::warn;
use url::Url;

use crate::error::ClientError;

pub const SETTINGS_FILE: &str = "casegen.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub provider: String,
    pub platform: String,
    pub depth: DepthTier,
    pub feature: String,
    pub project: String,
    pub folder: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            provider: DEFAULT_PROVIDER.into(),
            platform: DEFAULT_PLATFORM.into(),
            depth: DepthTier::Smoke,
            feature: DEFAULT_FEATURE.into(),
            project: DEFAULT_PROJECT.into(),
            folder: DEFAULT_FOLDER.into(),
        }
    }
}

/// Defaults, then `casegen.toml` in the working directory, then the environment.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(file) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, env);

    settings
}

fn apply_file(settings: &mut ClientSettings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!("config: ignoring unreadable {SETTINGS_FILE}: {err}");
            return;
        }
    };

    if let Some(v) = file_cfg.get("base_url") {
        settings.base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("provider") {
        settings.provider = v.clone();
    }
    if let Some(v) = file_cfg.get("platform") {
        settings.platform = v.clone();
    }
    if let Some(v) = file_cfg.get("depth") {
        set_depth(settings, v);
    }
    if let Some(v) = file_cfg.get("feature") {
        settings.feature = v.clone();
    }
    if let Some(v) = file_cfg.get("project") {
        settings.project = v.clone();
    }
    if let Some(v) = file_cfg.get("folder") {
        settings.folder = v.clone();
    }
}

fn apply_env(settings: &mut ClientSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("CASEGEN_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = env("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = env("CASEGEN_PROVIDER") {
        settings.provider = v;
    }
    if let Some(v) = env("CASEGEN_PLATFORM") {
        settings.platform = v;
    }
    if let Some(v) = env("CASEGEN_DEPTH") {
        set_depth(settings, &v);
    }
    if let Some(v) = env("CASEGEN_PROJECT") {
        settings.project = v;
    }
    if let Some(v) = env("CASEGEN_FOLDER") {
        settings.folder = v;
    }
}

fn set_depth(settings: &mut ClientSettings, raw: &str) {
    match raw.parse::<DepthTier>() {
        Ok(depth) => settings.depth = depth,
        Err(err) => warn!("config: {err}; keeping {}", settings.depth),
    }
}

/// Maps an `http(s)://` service base to its `ws(s)://…/api/ws/generation` endpoint.
pub fn generation_endpoint(base_url: &str) -> Result<Url, ClientError> {
    let base_url = base_url.trim().trim_end_matches('/');
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base_url.starts_with("ws://") || base_url.starts_with("wss://") {
        base_url.to_string()
    } else {
        return Err(ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: "must start with http://, https://, ws:// or wss://".into(),
        });
    };

    Url::parse(&format!("{ws_base}{GENERATION_WS_PATH}")).map_err(|err| {
        ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        }
    })
}

/// Joins a REST path onto the service base, keeping any path prefix.
pub fn rest_endpoint(base_url: &str, path: &str) -> Result<Url, ClientError> {
    let base_url = base_url.trim().trim_end_matches('/');
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: "must start with http:// or https://".into(),
        });
    }
    Url::parse(&format!("{base_url}{path}")).map_err(|err| ClientError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
