//! RPC service adapter around the module.
//!
//! The server routes frames by service name to an [`RpcService`]. The only
//! implementation is [`ModuleService`], which exposes a single method and
//! forwards it to the module's entry point.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::module::ExecutableModule;
use crate::network::NetworkContext;
use crate::types::{ApiContract, Error, Result};

/// Request body field carrying the serialized params.
pub const PARAMS_FIELD: &str = "params_json";
/// Response body field carrying the serialized result.
pub const RESPONSE_FIELD: &str = "response_json";

/// A named service the server dispatches requests to.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Methods this service answers. Used for logging at registration.
    fn methods(&self) -> Vec<String>;

    async fn call(&self, method: &str, body: Value) -> Result<Value>;
}

/// Exposes the module's entry point as the `Execute` RPC.
///
/// Holds no mutable state; concurrent calls run fully in parallel and any
/// serialisation they need is up to the module.
pub struct ModuleService {
    module: Box<dyn ExecutableModule>,
    network_ctx: Arc<NetworkContext>,
    service_name: String,
    execute_method: String,
}

impl std::fmt::Debug for ModuleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleService")
            .field("service_name", &self.service_name)
            .field("execute_method", &self.execute_method)
            .field("network_ctx", &self.network_ctx)
            .finish_non_exhaustive()
    }
}

impl ModuleService {
    pub fn new(
        module: Box<dyn ExecutableModule>,
        network_ctx: Arc<NetworkContext>,
        api: &ApiContract,
    ) -> Self {
        Self {
            module,
            network_ctx,
            service_name: api.service_name.clone(),
            execute_method: api.execute_method.clone(),
        }
    }

    /// Run the module once. Module errors and panics are confined to this call.
    pub async fn execute(&self, serialized_params: &str) -> Result<String> {
        let invocation = self.module.execute(&self.network_ctx, serialized_params);
        match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                tracing::warn!("Module execution returned an error: {}", e);
                Err(Error::module(e.to_string()))
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!("Module panicked during execution: {}", detail);
                Err(Error::internal(format!("module panicked: {}", detail)))
            }
        }
    }
}

#[async_trait]
impl RpcService for ModuleService {
    fn name(&self) -> &str {
        &self.service_name
    }

    fn methods(&self) -> Vec<String> {
        vec![self.execute_method.clone()]
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value> {
        if method != self.execute_method {
            return Err(Error::not_found(format!(
                "Unknown method: {}.{}",
                self.service_name, method
            )));
        }
        let params = body
            .get(PARAMS_FIELD)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation(format!("Missing required field: {}", PARAMS_FIELD)))?;

        let result = self.execute(params).await?;
        Ok(serde_json::json!({ RESPONSE_FIELD: result }))
    }
}
