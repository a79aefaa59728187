//! Session runner configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via DMCC_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by `main`)

use dmcc_client::{ConnectionConfig, TlsClientConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Runner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AES server connection settings.
    pub server: ServerConfig,
    /// TLS trust and identity.
    pub tls: TlsConfig,
    /// Switch and station the session talks about.
    pub switch: SwitchConfig,
    /// Session behaviour.
    pub session: SessionConfig,
}

impl Config {
    /// Loads configuration from `path` (if any), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a variable lookup (the process environment in practice).
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.server.apply_overrides(&var);
        self.tls.apply_overrides(&var);
        self.switch.apply_overrides(&var);
        self.session.apply_overrides(&var);
    }

    /// Checks that the configuration can open a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("server.host is empty".into()));
        }
        if let Some(ref name) = self.server.server_name {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation("server.server_name is empty".into()));
            }
        }
        if self.tls.client_cert.is_some() != self.tls.client_key.is_some() {
            return Err(ConfigError::Validation(
                "tls.client_cert and tls.client_key must be set together".into(),
            ));
        }
        if self.server.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.connect_timeout_secs must be at least 1".into(),
            ));
        }
        if self.server.read_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.read_timeout_secs must be at least 1".into(),
            ));
        }
        if self.session.response_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "session.response_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Builds the client connection configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut tls = TlsClientConfig::new();
        if let Some(ref path) = self.tls.ca_cert {
            tls = tls.with_ca_cert(path);
        }
        if let (Some(cert), Some(key)) = (&self.tls.client_cert, &self.tls.client_key) {
            tls = tls.with_client_cert(cert, key);
        }

        let mut config = ConnectionConfig::new(&self.server.host, self.server.port)
            .with_connect_timeout(Duration::from_secs(self.server.connect_timeout_secs))
            .with_read_timeout(Duration::from_secs(self.server.read_timeout_secs))
            .with_tls(tls);
        if let Some(ref name) = self.server.server_name {
            config = config.with_server_name(name);
        }
        config
    }
}

/// AES server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address or host name of the AES server.
    pub host: String,
    /// Secure DMCC port.
    pub port: u16,
    /// FQDN the server certificate must carry (defaults to `host`).
    pub server_name: Option<String>,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: dmcc_protocol::DEFAULT_PORT,
            server_name: None,
            connect_timeout_secs: 5,
            read_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("DMCC_HOST") {
            self.host = host;
        }
        if let Some(port) = var("DMCC_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }
        if let Some(name) = var("DMCC_SERVER_NAME") {
            self.server_name = Some(name);
        }
    }
}

/// TLS file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM bundle of trusted CAs (Mozilla roots if unset).
    pub ca_cert: Option<PathBuf>,
    /// PEM client certificate for mutual TLS.
    pub client_cert: Option<PathBuf>,
    /// PEM client private key for mutual TLS.
    pub client_key: Option<PathBuf>,
}

impl TlsConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("DMCC_CA_CERT") {
            self.ca_cert = Some(PathBuf::from(path));
        }
        if let Some(path) = var("DMCC_CLIENT_CERT") {
            self.client_cert = Some(PathBuf::from(path));
        }
        if let Some(path) = var("DMCC_CLIENT_KEY") {
            self.client_key = Some(PathBuf::from(path));
        }
    }
}

/// Switch connection and station.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Switch connection name as configured on the AES server.
    pub switch_conn_name: String,
    /// IP address or FQDN of the communication manager.
    pub switch_name: String,
    /// Station extension.
    pub extension: String,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            switch_conn_name: "CM".to_string(),
            switch_name: String::new(),
            extension: String::new(),
        }
    }
}

impl SwitchConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(name) = var("DMCC_SWITCH_CONN_NAME") {
            self.switch_conn_name = name;
        }
        if let Some(name) = var("DMCC_SWITCH_NAME") {
            self.switch_name = name;
        }
        if let Some(ext) = var("DMCC_EXTENSION") {
            self.extension = ext;
        }
    }
}

/// Session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// XML template for StartApplicationSession.
    pub app_session_template: PathBuf,
    /// How long to wait for each response.
    pub response_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_session_template: PathBuf::from("appsession.xml"),
            response_timeout_secs: 5,
        }
    }
}

impl SessionConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("DMCC_APP_SESSION_TEMPLATE") {
            self.app_session_template = PathBuf::from(path);
        }
        if let Some(timeout) = var("DMCC_RESPONSE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.response_timeout_secs = secs;
            }
        }
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
