//! Configuration management for Lexia services.
//!
//! The agent reads a single JSON file at `~/.lexia/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Server
//! - `LEXIA_HOST` (or `HOST`) → server.host
//! - `LEXIA_PORT` (or `PORT`) → server.port
//!
//! ## Auth
//! - `DPK_SHARED_SECRET` → auth.shared_secret
//!
//! ## Agent
//! - `APP_NAME` → agent.app_name
//! - `GEMINI_MODEL` → agent.model
//! - `AGENT_INSTRUCTION` → agent.instruction
//! - `DPK_AGENT_URL` → agent.reply_endpoint
//! - `LEXIA_REPLY_TIMEOUT_SECS` → agent.reply_timeout_secs
//!
//! ## Deduplication
//! - `LEXIA_DEDUP_RETENTION_SECS` → dedup.retention_secs
//!
//! ## Observability
//! - `LEXIA_LOG_LEVEL` → observability.log_level
//! - `LEXIA_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".lexia"),
        |dirs| dirs.home_dir().join(".lexia"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    /// Default: "0.0.0.0", since Cloud Run only injects `PORT`.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8000
}

// ============================================================================
// Auth Configuration
// ============================================================================

/// Shared-secret authentication between the webhook relay and the agent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Expected value of the `x-dpk-secret` header. `None` disables the check.
    #[serde(default)]
    pub shared_secret: Option<String>,
}

impl AuthConfig {
    /// Header carrying the shared secret.
    pub const HEADER: &'static str = "x-dpk-secret";

    /// The configured secret, if any.
    pub fn secret(&self) -> Option<&str> {
        self.shared_secret.as_deref()
    }
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Reply generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Model the upstream agent is expected to run.
    #[serde(default = "default_model")]
    pub model: String,

    /// System instruction handed to the upstream agent.
    #[serde(default = "default_instruction")]
    pub instruction: String,

    /// Remote agent endpoint. When unset, replies come from the local template.
    #[serde(default)]
    pub reply_endpoint: Option<String>,

    /// Timeout for a single remote reply, in seconds.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            model: default_model(),
            instruction: default_instruction(),
            reply_endpoint: None,
            reply_timeout_secs: default_reply_timeout_secs(),
        }
    }
}

fn default_app_name() -> String {
    "lexia".into()
}

fn default_model() -> String {
    "gemini-2.5-pro".into()
}

fn default_instruction() -> String {
    "Você é um atendente da Léxia Veículos. Responda de forma amigável e profissional.".into()
}

fn default_reply_timeout_secs() -> u64 {
    60
}

// ============================================================================
// Deduplication Configuration
// ============================================================================

/// Retention policy for processed message identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How long a message id stays "seen". `None` keeps ids for the process lifetime.
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// Interval between purges of expired ids. Only used with `retention_secs`.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_secs: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    60
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Aliases: "level"
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    /// Aliases: "format"
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the Lexia agent service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using an arbitrary variable lookup.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(*k));

        if let Some(host) = first(&["LEXIA_HOST", "HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = first(&["LEXIA_PORT", "PORT"]) {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring unparsable port override"),
            }
        }

        if let Some(secret) = lookup("DPK_SHARED_SECRET") {
            // An exported-but-empty secret means "not configured".
            self.auth.shared_secret = if secret.is_empty() { None } else { Some(secret) };
        }

        if let Some(name) = lookup("APP_NAME") {
            self.agent.app_name = name;
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.agent.model = model;
        }
        if let Some(instruction) = lookup("AGENT_INSTRUCTION") {
            self.agent.instruction = instruction;
        }
        if let Some(url) = lookup("DPK_AGENT_URL") {
            self.agent.reply_endpoint = if url.is_empty() { None } else { Some(url) };
        }
        if let Some(secs) = lookup("LEXIA_REPLY_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(s) => self.agent.reply_timeout_secs = s,
                Err(_) => tracing::warn!(value = %secs, "Ignoring unparsable reply timeout override"),
            }
        }

        if let Some(secs) = lookup("LEXIA_DEDUP_RETENTION_SECS") {
            match secs.parse() {
                Ok(s) => self.dedup.retention_secs = Some(s),
                Err(_) => tracing::warn!(value = %secs, "Ignoring unparsable dedup retention override"),
            }
        }

        if let Some(level) = lookup("LEXIA_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("LEXIA_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Save configuration to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert!(config.auth.secret().is_none());
        assert_eq!(config.agent.model, "gemini-2.5-pro");
        assert_eq!(config.agent.reply_timeout_secs, 60);
        assert!(config.dedup.retention_secs.is_none());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server": {"port": 9100}, "auth": {"shared_secret": "s3"}}"#)
                .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.secret(), Some("s3"));
        assert_eq!(config.agent.app_name, "lexia");
    }

    #[test]
    fn test_observability_aliases() {
        let config: Config =
            serde_json::from_str(r#"{"observability": {"level": "debug", "format": "json"}}"#)
                .unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides_from(lookup_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("DPK_SHARED_SECRET", "topsecret"),
            ("GEMINI_MODEL", "gemini-2.5-flash"),
            ("DPK_AGENT_URL", "http://agent.internal:8000/"),
            ("LEXIA_DEDUP_RETENTION_SECS", "86400"),
            ("LEXIA_LOG_FORMAT", "json"),
        ]));

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.secret(), Some("topsecret"));
        assert_eq!(config.agent.model, "gemini-2.5-flash");
        assert_eq!(
            config.agent.reply_endpoint.as_deref(),
            Some("http://agent.internal:8000/")
        );
        assert_eq!(config.dedup.retention_secs, Some(86400));
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_prefixed_env_wins_over_plain() {
        let mut config = Config::default();
        config.apply_env_overrides_from(lookup_from(&[("LEXIA_PORT", "9000"), ("PORT", "8080")]));
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_empty_secret_disables_auth() {
        let mut config = Config::default();
        config.auth.shared_secret = Some("from-file".into());
        config.apply_env_overrides_from(lookup_from(&[("DPK_SHARED_SECRET", "")]));
        assert!(config.auth.secret().is_none());
    }

    #[test]
    fn test_bad_port_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides_from(lookup_from(&[("PORT", "not-a-port")]));
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_bad_numeric_overrides_are_ignored() {
        let mut config = Config::default();
        config.dedup.retention_secs = Some(600);
        config.apply_env_overrides_from(lookup_from(&[
            ("LEXIA_REPLY_TIMEOUT_SECS", "soon"),
            ("LEXIA_DEDUP_RETENTION_SECS", "-1"),
        ]));
        assert_eq!(config.agent.reply_timeout_secs, 60);
        assert_eq!(config.dedup.retention_secs, Some(600));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.server.port = 8123;
        config.agent.reply_endpoint = Some("http://localhost:9000".into());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 8123);
        assert_eq!(
            loaded.agent.reply_endpoint.as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_bind_address() {
        let config = Config::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
    }
}
