use proto::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// File name looked up in the working directory.
const LOCAL_CONFIG_FILE: &str = "wsgate.toml";

/// Top-level `wsgate` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Handler configuration.
    #[serde(default)]
    pub handler: HandlerConfig,
}

/// `[server]` section.
///
/// Environment overrides:
/// - `WSGATE_BIND`: listen address (default `127.0.0.1:8080`)
/// - `WSGATE_WS_PATH`: WebSocket endpoint path (default `/`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_ws_path() -> String {
    gateway::server::DEFAULT_WS_PATH.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ws_path: default_ws_path(),
        }
    }
}

/// `[handler]` section.
///
/// Environment overrides:
/// - `WSGATE_HANDLER_TIMEOUT_SECS`: per-invocation time budget
/// - `WSGATE_REPLY`: text the built-in handler answers every message with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_reply")]
    pub reply: String,
}

fn default_timeout_secs() -> u64 {
    gateway::HANDLER_TIMEOUT.as_secs()
}

fn default_reply() -> String {
    "hello".to_string()
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            reply: default_reply(),
        }
    }
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().ok();
        let home = std::env::var("HOME").ok().map(PathBuf::from);
        Self::load_with(path, cwd.as_deref(), home.as_deref(), |key| {
            std::env::var(key).ok()
        })
    }

    /// [`Config::load`] with the directories and environment supplied by the caller.
    pub fn load_with(
        path: Option<&Path>,
        cwd: Option<&Path>,
        home: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let config_path = resolve_path(path, cwd, home);
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        config.apply_env(env)?;
        config.validate()?;

        debug!(
            bind = %config.server.bind,
            ws_path = %config.server.ws_path,
            timeout_secs = config.handler.timeout_secs,
            "Config loaded"
        );
        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(bind) = env("WSGATE_BIND") {
            self.server.bind = bind.parse().map_err(|e| invalid("WSGATE_BIND", e))?;
        }
        if let Some(path) = env("WSGATE_WS_PATH") {
            self.server.ws_path = path;
        }
        if let Some(secs) = env("WSGATE_HANDLER_TIMEOUT_SECS") {
            self.handler.timeout_secs = secs
                .parse()
                .map_err(|e| invalid("WSGATE_HANDLER_TIMEOUT_SECS", e))?;
        }
        if let Some(reply) = env("WSGATE_REPLY") {
            self.handler.reply = reply;
        }
        Ok(())
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handler.timeout_secs == 0 {
            return Err(invalid("handler.timeout_secs", "must be greater than zero"));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(invalid("server.ws_path", "must start with '/'"));
        }
        if self.server.ws_path == "/health" {
            return Err(invalid("server.ws_path", "'/health' is reserved"));
        }
        Ok(())
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler.timeout_secs)
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Toml(e.to_string()))
    }
}

/// Explicit path first, then `./wsgate.toml`, then `~/.wsgate/config.toml`.
fn resolve_path(
    explicit: Option<&Path>,
    cwd: Option<&Path>,
    home: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = cwd.map(|dir| dir.join(LOCAL_CONFIG_FILE));
    let user = home.map(|dir| dir.join(".wsgate").join("config.toml"));
    [local, user].into_iter().flatten().find(|p| p.exists())
}

fn invalid(field: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
