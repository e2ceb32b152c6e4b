//! Configuration structures.
//!
//! The harness constants (listen port, protocol, mount point, env var names)
//! live in an explicit immutable struct handed to the executor at
//! construction. Defaults match the production API contract; tests and
//! embedders override fields as needed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{Error, Result};

/// Global harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarnessConfig {
    /// RPC surface exposed to the orchestrator.
    #[serde(default)]
    pub api: ApiContract,

    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Names of the environment variables read at startup.
    #[serde(default)]
    pub env: EnvVarNames,

    /// Orchestrator connection settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Wire transport limits.
    #[serde(default)]
    pub ipc: IpcConfig,
}

impl HarnessConfig {
    /// Load a configuration from a JSON file. Missing sections take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::validation(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

/// Listening protocol for the module server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenProtocol {
    Tcp,
}

impl std::fmt::Display for ListenProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenProtocol::Tcp => f.write_str("tcp"),
        }
    }
}

/// Fixed service name / method / port / protocol the orchestrator calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiContract {
    pub service_name: String,
    pub execute_method: String,
    pub listen_port: u16,
    pub listen_protocol: ListenProtocol,
}

impl Default for ApiContract {
    fn default() -> Self {
        Self {
            service_name: "ModuleService".to_string(),
            execute_method: "Execute".to_string(),
            listen_port: 1111,
            listen_protocol: ListenProtocol::Tcp,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host the listener binds to. The port comes from [`ApiContract`].
    pub listen_host: String,

    /// Local mount point handed to the network context.
    pub execution_volume_mountpoint: PathBuf,

    /// How long in-flight calls may run after a shutdown request.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            execution_volume_mountpoint: PathBuf::from("/execution-volume"),
            shutdown_grace_period: Duration::from_secs(5),
        }
    }
}

/// Environment variables consumed once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVarNames {
    pub serialized_params: String,
    pub orchestrator_socket: String,
}

impl Default for EnvVarNames {
    fn default() -> Self {
        Self {
            serialized_params: "SERIALIZED_CUSTOM_PARAMS".to_string(),
            orchestrator_socket: "ORCHESTRATOR_SOCKET".to_string(),
        }
    }
}

/// Orchestrator connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on the initial dial.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Upper bound on a single orchestrator API call.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Plain TCP must be opted into explicitly.
    pub allow_insecure_transport: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            allow_insecure_transport: false,
        }
    }
}

/// IPC transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Maximum frame payload size in bytes.
    pub max_frame_bytes: u32,

    /// Maximum concurrent TCP connections. Connections beyond this limit
    /// are dropped on accept.
    pub max_connections: usize,

    /// Read timeout in seconds per frame. Connections idle beyond this
    /// duration are dropped.
    pub read_timeout_secs: u64,

    /// Write timeout in seconds per frame.
    pub write_timeout_secs: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 5 * 1024 * 1024,
            max_connections: 1000,
            read_timeout_secs: 300,
            write_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_match_api_contract() {
        let config = HarnessConfig::default();
        assert_eq!(config.api.service_name, "ModuleService");
        assert_eq!(config.api.execute_method, "Execute");
        assert_eq!(config.api.listen_port, 1111);
        assert_eq!(config.api.listen_protocol, ListenProtocol::Tcp);
        assert_eq!(config.server.shutdown_grace_period, Duration::from_secs(5));
        assert!(!config.orchestrator.allow_insecure_transport);
    }

    #[test]
    fn partial_json_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "server": {{
                    "listen_host": "127.0.0.1",
                    "execution_volume_mountpoint": "/tmp/vol",
                    "shutdown_grace_period": "250ms"
                }},
                "orchestrator": {{
                    "connect_timeout": "1s",
                    "request_timeout": "2s",
                    "allow_insecure_transport": true
                }}
            }}"#
        )
        .unwrap();

        let config = HarnessConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.server.listen_host, "127.0.0.1");
        assert_eq!(config.server.shutdown_grace_period, Duration::from_millis(250));
        assert_eq!(config.orchestrator.request_timeout, Duration::from_secs(2));
        assert!(config.orchestrator.allow_insecure_transport);
        assert_eq!(config.api.listen_port, 1111);
        assert_eq!(config.env.serialized_params, "SERIALIZED_CUSTOM_PARAMS");
    }

    #[test]
    fn missing_file_is_validation_error() {
        let err = HarnessConfig::from_json_file("/nonexistent/harness.json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
