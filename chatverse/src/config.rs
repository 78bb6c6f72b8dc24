//! Configuration system for the `ChatVerse` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/chatverse/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    session: SessionFileConfig,
    sync: SyncFileConfig,
    presence: PresenceFileConfig,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    username: Option<String>,
    user_id: Option<String>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    event_buffer: Option<usize>,
    backend_buffer: Option<usize>,
    page_size: Option<usize>,
    reconnect_base_delay_ms: Option<u64>,
    reconnect_max_delay_ms: Option<u64>,
    reconnect_max_attempts: Option<u32>,
}

/// `[presence]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct PresenceFileConfig {
    typing_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Session --
    /// Display name to connect with.
    pub username: Option<String>,
    /// Stable user id to connect as.
    pub user_id: Option<String>,

    // -- Sync --
    /// Buffer size for the client event channel.
    pub event_buffer: usize,
    /// Buffer size for the backend frame channel.
    pub backend_buffer: usize,
    /// Default page size for message listing.
    pub page_size: usize,
    /// First reconnect delay.
    pub reconnect_base_delay: Duration,
    /// Reconnect delay cap.
    pub reconnect_max_delay: Duration,
    /// Reconnect attempts before giving up.
    pub reconnect_max_attempts: u32,

    // -- Presence --
    /// Typing indicator inactivity timeout.
    pub typing_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: None,
            user_id: None,
            event_buffer: 64,
            backend_buffer: 256,
            page_size: 50,
            reconnect_base_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_secs(5),
            reconnect_max_attempts: 5,
            typing_timeout: Duration::from_secs(3),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/chatverse/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            username: cli
                .username
                .clone()
                .or_else(|| file.session.username.clone()),
            user_id: cli.user_id.clone().or_else(|| file.session.user_id.clone()),
            event_buffer: file.sync.event_buffer.unwrap_or(defaults.event_buffer),
            backend_buffer: file.sync.backend_buffer.unwrap_or(defaults.backend_buffer),
            page_size: file.sync.page_size.unwrap_or(defaults.page_size),
            reconnect_base_delay: file
                .sync
                .reconnect_base_delay_ms
                .map_or(defaults.reconnect_base_delay, Duration::from_millis),
            reconnect_max_delay: file
                .sync
                .reconnect_max_delay_ms
                .map_or(defaults.reconnect_max_delay, Duration::from_millis),
            reconnect_max_attempts: file
                .sync
                .reconnect_max_attempts
                .unwrap_or(defaults.reconnect_max_attempts),
            typing_timeout: file
                .presence
                .typing_timeout_secs
                .map_or(defaults.typing_timeout, Duration::from_secs),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Realtime chat synchronization client")]
pub struct CliArgs {
    /// Display name to connect with.
    #[arg(long, env = "CHATVERSE_USERNAME")]
    pub username: Option<String>,

    /// Stable user id to connect as.
    #[arg(long, env = "CHATVERSE_USER_ID")]
    pub user_id: Option<String>,

    /// Path to config file (default: `~/.config/chatverse/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CHATVERSE_LOG")]
    pub log_level: String,

    /// Path to log file (default: stderr only).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("chatverse").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
