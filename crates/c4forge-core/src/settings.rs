use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::RenderFormat;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

// --- AI Settings ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    /// Override for self-hosted or OpenAI-compatible endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            api_key: String::new(),
            model: "llama3.1".to_string(),
            base_url: None,
            temperature: Some(0.2),
            max_tokens: Some(2048),
            timeout_secs: 300,
        }
    }
}

impl AiSettings {
    pub fn configured(&self) -> bool {
        !self.provider.is_empty()
            && !self.model.is_empty()
            && (self.provider == "ollama" || self.base_url.is_some() || !self.api_key.is_empty())
    }
}

// --- Render Settings ---

/// Which rendering engine turns diagram source into an image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BackendSettings {
    /// Local `plantuml` executable. Looked up on PATH when `program` is unset.
    Command {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        program: Option<PathBuf>,
    },
    /// PlantUML server reachable over HTTP, e.g. `http://localhost:8080`.
    Server { url: String },
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings::Command { program: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderSettings {
    pub output_dir: PathBuf,
    pub format: RenderFormat,
    pub backend: BackendSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("uml-diagram"),
            format: RenderFormat::Png,
            backend: BackendSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ai: AiSettings,
    pub render: RenderSettings,
}

// --- Storage ---

/// Resolve the global config directory (~/.c4forge/).
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".c4forge")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Read settings, falling back to defaults when the file is missing or
/// unreadable.
pub fn load_settings(path: &Path) -> Settings {
    match read_settings_from(path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("ignoring {}: {e}", path.display());
            Settings::default()
        }
    }
}

/// Read settings from an explicit path. A missing file yields defaults.
pub fn read_settings_from(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write settings atomically (temp file + rename).
pub fn write_settings_to(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
