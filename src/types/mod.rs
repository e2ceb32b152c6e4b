//! Core types for the module harness.
//!
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: The immutable harness configuration (API contract, env var
//!   names, listener, orchestrator and transport limits)

mod config;
mod errors;

pub use config::{
    ApiContract, EnvVarNames, HarnessConfig, IpcConfig, ListenProtocol, OrchestratorConfig,
    ServerConfig,
};
pub use errors::{Error, ModuleError, Result};
