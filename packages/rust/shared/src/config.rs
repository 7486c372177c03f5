//! Application configuration for noirmap.
//!
//! User config lives at `~/.noirmap/noirmap.toml`.
//! CLI flags and environment variables override config file values, which
//! override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, Result};
use crate::types::HttpMethod;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "noirmap.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".noirmap";

// ---------------------------------------------------------------------------
// Config structs (matching noirmap.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inference service settings.
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Endpoint scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Output collection settings.
    #[serde(default)]
    pub collection: CollectionConfig,
}

/// `[inference]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible chat completions URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model to use for enrichment.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempt ceiling for transient failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Run-wide request budget.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Maximum enrichment calls in flight.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            requests_per_minute: default_requests_per_minute(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".into()
}
fn default_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".into()
}
fn default_model() -> String {
    "openai/gpt-oss-120b".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_requests_per_minute() -> u32 {
    30
}
fn default_max_concurrency() -> u32 {
    4
}

/// `[scanner]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Scanner executable, resolved through `PATH` when not absolute.
    #[serde(default = "default_scanner_binary")]
    pub binary: String,

    /// Extra arguments appended to the scanner command line.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            binary: default_scanner_binary(),
            extra_args: Vec::new(),
        }
    }
}

fn default_scanner_binary() -> String {
    "noir".into()
}

/// `[collection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name; derived from the repository when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Methods that get an example body attached.
    #[serde(default = "default_body_methods")]
    pub body_methods: Vec<HttpMethod>,

    /// Name of the env var holding the default auth token.
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: None,
            body_methods: default_body_methods(),
            auth_token_env: default_auth_token_env(),
        }
    }
}

fn default_body_methods() -> Vec<HttpMethod> {
    vec![HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch]
}
fn default_auth_token_env() -> String {
    "NOIRMAP_AUTH_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Enrichment config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime enrichment configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub requests_per_minute: u32,
    pub max_concurrency: usize,
}

impl From<&AppConfig> for EnrichmentConfig {
    fn from(config: &AppConfig) -> Self {
        let inf = &config.inference;
        Self {
            endpoint: inf.endpoint.clone(),
            model: inf.model.clone(),
            temperature: inf.temperature,
            timeout: Duration::from_secs(inf.timeout_secs),
            max_attempts: inf.max_attempts.max(1),
            base_backoff: Duration::from_millis(inf.base_backoff_ms),
            requests_per_minute: inf.requests_per_minute,
            max_concurrency: inf.max_concurrency.max(1) as usize,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.noirmap/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| MapperError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.noirmap/noirmap.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MapperError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MapperError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MapperError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MapperError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MapperError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the inference API key from the env var named in the config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.inference.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(MapperError::config(format!(
            "inference API key not found. Set the {var_name} environment variable \
             or pass --skip-enrichment."
        ))),
    }
}

/// Check that the inference API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(config).map(|_| ())
}
