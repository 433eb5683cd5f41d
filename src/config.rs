//! Kit configuration
//!
//! Defaults are tuned per provider; [`KitConfig::from_env`] applies the
//! environment overrides and [`KitConfig::from_yaml_file`] loads a YAML file
//! (missing fields fall back to defaults).

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::resilience::RetryConfig;
use crate::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KitConfig {
    pub http: HttpConfig,
    pub replicate: ReplicateConfig,
    pub gemini: GeminiConfig,
    pub meshy: MeshyConfig,
    pub whisper: WhisperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub proxy_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            proxy_url: None,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry settings as they appear in configuration files (seconds as floats).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_s: f64,
    pub max_delay_s: f64,
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::from_secs(self.max_retries, self.base_delay_s, self.max_delay_s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateConfig {
    pub api_token: Option<String>,
    pub base_url: String,
    pub retry: RetrySettings,
    /// Seconds to ask the API to hold the connection open (`Prefer: wait=N`).
    pub wait_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: "https://api.replicate.com".to_string(),
            retry: RetrySettings {
                max_retries: 3,
                base_delay_s: 2.0,
                max_delay_s: 30.0,
            },
            wait_secs: 60,
            poll_interval_ms: 1_000,
            poll_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub retry: RetrySettings,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            retry: RetrySettings {
                max_retries: 5,
                base_delay_s: 1.0,
                max_delay_s: 10.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshyConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub retry: RetrySettings,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
}

impl Default for MeshyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.meshy.ai".to_string(),
            retry: RetrySettings {
                max_retries: 3,
                base_delay_s: 2.0,
                max_delay_s: 30.0,
            },
            poll_interval_ms: 5_000,
            poll_timeout_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub default_model: String,
    pub device: Option<String>,
    pub download_root: Option<String>,
    /// Name or path of the whisper command-line executable.
    pub executable: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            default_model: "base".to_string(),
            device: None,
            download_root: None,
            executable: "whisper".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl KitConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Loads a YAML file, then applies environment overrides on top.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut cfg = Self::from_yaml_str(&raw)?;
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_env(&mut self) {
        if let Some(t) = env_parse::<u64>("AI_HTTP_TIMEOUT_SECS")
            .or_else(|| env_parse::<u64>("AI_TIMEOUT_SECS"))
        {
            self.http.timeout_secs = t;
        }
        if let Ok(proxy) = env::var("AI_PROXY_URL") {
            if !proxy.trim().is_empty() {
                self.http.proxy_url = Some(proxy);
            }
        }

        if let Some(n) = env_parse::<u32>("AI_KIT_GEMINI_MAX_RETRIES") {
            self.gemini.retry.max_retries = n;
        }
        if let Some(d) = env_parse::<f64>("AI_KIT_GEMINI_BASE_DELAY_S") {
            self.gemini.retry.base_delay_s = d;
        }
        if let Some(d) = env_parse::<f64>("AI_KIT_GEMINI_MAX_DELAY_S") {
            self.gemini.retry.max_delay_s = d;
        }

        if let Ok(device) = env::var("AI_KIT_WHISPER_DEVICE") {
            if !device.trim().is_empty() {
                self.whisper.device = Some(device);
            }
        }
    }
}
