//! Configuration management for repl-tunnel.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cli::Args;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Raw socket listener.
    pub server: ServerSection,
    /// HTTP and function-invocation transport.
    pub http: HttpSection,
    /// Per-session REPL defaults.
    pub repl: ReplOptions,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Raw socket listener section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Start the listener at all.
    pub listen: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 30303,
            listen: true,
        }
    }
}

/// HTTP transport section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Route accepting `{id?, cmd}` submissions.
    pub path: String,
    /// Session used when a request carries no id.
    pub default_session: String,
    /// Function name served under `/invoke/{function}`.
    pub function: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8888,
            path: "/repl".to_string(),
            default_session: "web".to_string(),
            function: "repl".to_string(),
        }
    }
}

/// Options every new session starts from.
///
/// `set repl.<field> <value>` merges into a session's copy at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplOptions {
    /// Inspection depth; `null` means unlimited.
    pub depth: Option<usize>,
    /// Alias text to expansion text.
    pub alias: BTreeMap<String, String>,
    /// Start sessions with act tracing on.
    pub trace: bool,
}

impl Default for ReplOptions {
    fn default() -> Self {
        let alias = [
            ("stats", "role:seneca,stats:true"),
            ("stats full", "role:seneca,stats:true,summary:false"),
            ("tree", "list"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            depth: Some(11),
            alias,
            trace: false,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level or filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("REPL_TUNNEL_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("REPL_TUNNEL_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        if let Some(port) = var("REPL_TUNNEL_HTTP_PORT").and_then(|p| p.parse().ok()) {
            self.http.port = port;
        }

        if let Some(level) = var("REPL_TUNNEL_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref host) = args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(port) = args.http_port {
            self.http.port = port;
        }
        if args.no_http {
            self.http.enabled = false;
        }
        if args.no_listen {
            self.server.listen = false;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env();
        config.apply_args(args);
        Ok(config)
    }

    /// Socket address of the raw listener.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.server.host, self.server.port)
    }

    /// Socket address of the HTTP transport.
    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.http.host, self.http.port)
    }

    /// Session id used when none is given: the listener's `host:port`.
    pub fn default_session_id(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// The initial options tree handed to the host.
    pub fn host_options(&self) -> Value {
        json!({ "repl": self.repl })
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let ip: IpAddr = host
        .parse()
        .map_err(|_| ConfigError::InvalidHost(host.to_string()))?;
    Ok(SocketAddr::new(ip, port))
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
        }
    }
}

impl std::error::Error for ConfigError {}
