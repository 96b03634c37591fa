//! Application configuration
//!
//! Loaded from `config.toml` in the platform config directory, with the
//! credential overridable from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Environment variables checked for the credential, in order
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub live: LiveConfig,
    pub audio: AudioConfig,
    pub ui: UiConfig,
}

/// Remote endpoint settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    /// Milliseconds to wait for `setupComplete` before giving up
    pub setup_timeout_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            setup_timeout_ms: SETUP_TIMEOUT_MS,
        }
    }
}

// Hand-written so the credential never reaches a log line.
impl std::fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("system_instruction", &self.system_instruction)
            .field("setup_timeout_ms", &self.setup_timeout_ms)
            .finish()
    }
}

impl LiveConfig {
    /// The credential, if present and not blank
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Full endpoint URL including the credential query parameter
    pub fn endpoint_url(&self) -> Result<String> {
        let key = self
            .api_key()
            .ok_or_else(|| Error::Initialization("no API credential configured".to_string()))?;
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint {}: {}", self.endpoint, e)))?;
        url.query_pairs_mut().append_pair("key", key);
        Ok(url.into())
    }
}

/// Audio device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device id (see `audio::device::list_devices`); default device if unset
    pub input_device: Option<String>,
    /// Output device id; default device if unset
    pub output_device: Option<String>,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    /// Samples per captured frame
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            block_size: CAPTURE_BLOCK_SIZE,
        }
    }
}

/// Local control UI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Default location of the config file
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("ai", "navigator", "navigator-live")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the default location, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write to an explicit file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Override the credential from the environment
    pub fn apply_env(&mut self) {
        if let Some(key) = API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty())
        {
            self.live.api_key = Some(key);
        }
    }

    /// Check everything a session needs before it may start
    pub fn validate(&self) -> Result<()> {
        if self.live.api_key().is_none() {
            return Err(Error::Initialization(
                "No API key found. Cannot start live session.".to_string(),
            ));
        }
        if self.live.model.trim().is_empty() {
            return Err(Error::Initialization("model name is empty".to_string()));
        }
        if self.live.setup_timeout_ms == 0 {
            return Err(Error::Initialization("setup timeout must be non-zero".to_string()));
        }
        if self.audio.block_size == 0 {
            return Err(Error::Initialization("block size must be non-zero".to_string()));
        }
        if self.audio.input_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            return Err(Error::Initialization("sample rates must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Mime tag attached to every captured frame
    pub fn input_mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.audio.input_sample_rate)
    }
}
