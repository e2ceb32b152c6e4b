//! Module capabilities supplied by the embedding application.
//!
//! A [`ModuleFactory`] turns the serialized params blob into an
//! [`ExecutableModule`]. The harness never interprets either the params or
//! the module's results.
//!
//! # Thread safety
//!
//! The server dispatches calls from different connections concurrently and
//! takes no lock around [`ExecutableModule::execute`]. Modules that need
//! mutual exclusion or ordering must provide it themselves.

use async_trait::async_trait;

use crate::network::NetworkContext;
use crate::types::ModuleError;

/// A unit of user logic with a single entry point.
#[async_trait]
pub trait ExecutableModule: Send + Sync + 'static {
    /// Run one invocation. `serialized_params` is passed through untouched
    /// from the caller; the returned string goes back untouched.
    async fn execute(
        &self,
        network_ctx: &NetworkContext,
        serialized_params: &str,
    ) -> Result<String, ModuleError>;
}

/// Builds the module from its serialized configuration. Called exactly once
/// per process.
#[cfg_attr(test, mockall::automock)]
pub trait ModuleFactory: Send + Sync {
    fn create(&self, serialized_params: &str) -> Result<Box<dyn ExecutableModule>, ModuleError>;
}

/// Module that returns its input unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoModule;

#[async_trait]
impl ExecutableModule for EchoModule {
    async fn execute(
        &self,
        _network_ctx: &NetworkContext,
        serialized_params: &str,
    ) -> Result<String, ModuleError> {
        Ok(serialized_params.to_string())
    }
}

/// Factory for [`EchoModule`]. The params blob must be valid JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoModuleFactory;

impl ModuleFactory for EchoModuleFactory {
    fn create(&self, serialized_params: &str) -> Result<Box<dyn ExecutableModule>, ModuleError> {
        serde_json::from_str::<serde_json::Value>(serialized_params)?;
        Ok(Box::new(EchoModule))
    }
}
