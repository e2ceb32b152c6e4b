//! Network context handed to the module on every invocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::network::client::OrchestratorClient;
use crate::types::{Error, IpcConfig, OrchestratorConfig, Result};

/// Container definition for [`NetworkContext::add_service`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddServiceArgs {
    pub image: String,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Ports in `<number>/<protocol>` form, e.g. `8080/tcp`.
    #[serde(default)]
    pub used_ports: Vec<String>,
}

/// What the orchestrator knows about a running service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_id: String,
    pub ip_address: String,
    #[serde(default)]
    pub used_ports: Vec<String>,
}

/// Polling parameters for [`NetworkContext::wait_for_http_get_endpoint_availability`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointWait {
    pub port: u16,
    pub path: String,
    pub initial_delay_milliseconds: u32,
    pub retries: u32,
    pub retries_delay_milliseconds: u32,
    /// Expected response body; empty accepts any 200.
    #[serde(default)]
    pub body_text: String,
}

/// The module's handle to the orchestrator's side-channel API.
///
/// Read-only apart from the underlying connection, so a single instance is
/// shared by reference across concurrent invocations.
#[derive(Debug)]
pub struct NetworkContext {
    client: OrchestratorClient,
    execution_volume_mountpoint: PathBuf,
}

impl NetworkContext {
    pub fn new(client: OrchestratorClient, execution_volume_mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            client,
            execution_volume_mountpoint: execution_volume_mountpoint.into(),
        }
    }

    /// Dial the orchestrator at `addr` and wrap the connection.
    pub async fn connect(
        addr: &str,
        execution_volume_mountpoint: impl Into<PathBuf>,
        orchestrator: &OrchestratorConfig,
        ipc: &IpcConfig,
    ) -> Result<Self> {
        let client = OrchestratorClient::connect(addr, orchestrator, ipc.max_frame_bytes).await?;
        Ok(Self::new(client, execution_volume_mountpoint))
    }

    /// Local path where the shared execution volume is mounted.
    pub fn execution_volume_mountpoint(&self) -> &Path {
        &self.execution_volume_mountpoint
    }

    pub fn orchestrator_addr(&self) -> &str {
        self.client.addr()
    }

    /// Start a dependent service in the module's network.
    pub async fn add_service(&self, service_id: &str, args: &AddServiceArgs) -> Result<ServiceInfo> {
        if service_id.is_empty() {
            return Err(Error::validation("service_id must not be empty"));
        }
        let body = serde_json::json!({
            "service_id": service_id,
            "image": args.image,
            "cmd": args.cmd,
            "env": args.env,
            "used_ports": args.used_ports,
        });
        let response = self.client.call("AddService", body).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Stop and remove a service, giving its container the stated time to exit.
    pub async fn remove_service(
        &self,
        service_id: &str,
        container_stop_timeout_seconds: u64,
    ) -> Result<()> {
        self.client
            .call(
                "RemoveService",
                serde_json::json!({
                    "service_id": service_id,
                    "container_stop_timeout_seconds": container_stop_timeout_seconds,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_service_info(&self, service_id: &str) -> Result<ServiceInfo> {
        let response = self
            .client
            .call("GetServiceInfo", serde_json::json!({ "service_id": service_id }))
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    /// IDs of every service currently in the network.
    pub async fn get_services(&self) -> Result<Vec<String>> {
        let response = self.client.call("GetServices", serde_json::json!({})).await?;
        let ids = response
            .get("service_ids")
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(ids)?)
    }

    /// Block until the orchestrator sees `GET <path>` succeed on the service.
    pub async fn wait_for_http_get_endpoint_availability(
        &self,
        service_id: &str,
        wait: &EndpointWait,
    ) -> Result<()> {
        let mut body = serde_json::to_value(wait)?;
        if let Value::Object(map) = &mut body {
            map.insert("service_id".to_string(), Value::String(service_id.to_string()));
        }
        self.client
            .call("WaitForHttpGetEndpointAvailability", body)
            .await?;
        Ok(())
    }
}
