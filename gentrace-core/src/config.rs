use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::model::{DEFAULT_EMBED_MODEL, DEFAULT_GENERATE_MODEL};
use crate::telemetry::{DEFAULT_MAX_PAYLOAD_CHARS, INSTRUMENTATION_SCOPE};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BackendCfg {
    /// Name of the environment variable that contains the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_base")]
    pub base: String,
}

impl Default for BackendCfg {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base: default_base(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

/// Models used when a caller omits one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ModelDefaults {
    #[serde(default = "default_generate_model")]
    pub generate: String,
    #[serde(default = "default_embed_model")]
    pub embed: String,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            generate: default_generate_model(),
            embed: default_embed_model(),
        }
    }
}

fn default_generate_model() -> String {
    DEFAULT_GENERATE_MODEL.to_string()
}
fn default_embed_model() -> String {
    DEFAULT_EMBED_MODEL.to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 60000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    #[default]
    Console,
    Otlp,
    None,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TelemetryCfg {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub exporter: ExporterKind,
    /// OTLP/HTTP collector base URL; `/v1/traces` and `/v1/metrics` are appended.
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
    #[serde(default = "default_metric_export_interval_ms")]
    pub metric_export_interval_ms: u64,
    /// Used when `RUST_LOG` is unset. Operation spans use the `gen_ai` target
    /// and stay enabled at `info` even under `warn`; add e.g. `gen_ai=off` to
    /// turn them off.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Prompt, content and response span attributes are cut to this many chars.
    #[serde(default = "default_max_payload_chars")]
    pub max_payload_chars: usize,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            exporter: ExporterKind::default(),
            otlp_endpoint: default_otlp_endpoint(),
            metric_export_interval_ms: default_metric_export_interval_ms(),
            log_filter: default_log_filter(),
            max_payload_chars: default_max_payload_chars(),
        }
    }
}

fn default_service_name() -> String {
    INSTRUMENTATION_SCOPE.to_string()
}
fn default_otlp_endpoint() -> String {
    "http://localhost:4318".to_string()
}
fn default_metric_export_interval_ms() -> u64 {
    10_000
}
fn default_log_filter() -> String {
    "info".to_string()
}
fn default_max_payload_chars() -> usize {
    DEFAULT_MAX_PAYLOAD_CHARS
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendCfg,
    #[serde(default)]
    pub models: ModelDefaults,
    /// HTTP client configuration (timeouts, pooling). Missing → defaults.
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub telemetry: TelemetryCfg,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::error::CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(crate::error::GenAiError::from)?;
        let s =
            std::str::from_utf8(&bytes).map_err(|e| crate::error::GenAiError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::GenAiError::Other(e.into()))?,
            Some("toml") => toml::from_str::<Self>(s)
                .map_err(|e| crate::error::GenAiError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::GenAiError::Other(e.into()))
                .or_else(|_| {
                    toml::from_str::<Self>(s)
                        .map_err(|e| crate::error::GenAiError::Other(e.into()))
                })?,
        };
        Ok(cfg)
    }
}
