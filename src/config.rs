//! Configuration for the discovery engine and its HTTP front end.
//!
//! The config file is optional. A missing or empty file yields
//! `Config::default()`, and the `USER_AGENT` environment variable overrides
//! the configured outbound user agent when it is set to a non-blank value.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// User agent sent when neither the config file nor the environment sets one.
pub const DEFAULT_USER_AGENT: &str = "feedfinder/0.1";

/// Environment variable that overrides [`Config::user_agent`].
pub const USER_AGENT_ENV: &str = "USER_AGENT";

/// Process-wide settings, built once at startup and passed down explicitly.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Outbound `User-Agent` header.
    pub user_agent: String,

    /// Hard timeout for one fetch, connect through last body byte.
    pub timeout_secs: u64,

    /// Response bodies larger than this are abandoned.
    pub max_body_bytes: usize,

    /// Redirect hops followed per fetch. Each hop is re-checked against the address policy.
    pub max_redirects: usize,

    /// Well-known paths probed at the same time.
    pub probe_concurrency: usize,

    /// Suspected feed anchors verified at the same time.
    pub verify_concurrency: usize,

    /// Upper bound on anchor candidates verified per page.
    pub max_suspected_links: usize,

    /// Bind address for `feedfinder serve`.
    pub listen: String,

    /// Target hosts ending with any of these suffixes are rejected at the boundary.
    pub banned_suffixes: Vec<String>,

    /// Lets fetches reach loopback/private addresses. Only for local test servers.
    pub allow_private_networks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 3,
            max_body_bytes: 5 * 1024 * 1024,
            max_redirects: 5,
            probe_concurrency: 4,
            verify_concurrency: 4,
            max_suspected_links: 16,
            listen: "127.0.0.1:8080".to_string(),
            banned_suffixes: vec![".gov.cn".to_string(), ".edu.cn".to_string()],
            allow_private_networks: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "user_agent",
        "timeout_secs",
        "max_body_bytes",
        "max_redirects",
        "probe_concurrency",
        "verify_concurrency",
        "max_suspected_links",
        "listen",
        "banned_suffixes",
        "allow_private_networks",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from TOML text, applying defaults for missing keys.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(content)?;
        config.user_agent = resolve_user_agent(None, &config.user_agent);
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides (`USER_AGENT`).
    pub fn apply_env(mut self) -> Self {
        let env_value = std::env::var(USER_AGENT_ENV).ok();
        self.user_agent = resolve_user_agent(env_value.as_deref(), &self.user_agent);
        self
    }

    /// Reject values that would make discovery unable to make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be > 0".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be > 0".into()));
        }
        if self.probe_concurrency == 0 || self.verify_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "probe_concurrency and verify_concurrency must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Picks the effective user agent.
///
/// A non-blank `env_value` wins, then a non-blank `configured` value, then
/// [`DEFAULT_USER_AGENT`].
pub fn resolve_user_agent(env_value: Option<&str>, configured: &str) -> String {
    env_value
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .or_else(|| Some(configured.trim()).filter(|ua| !ua.is_empty()))
        .unwrap_or(DEFAULT_USER_AGENT)
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
