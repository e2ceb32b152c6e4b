//! Orchestrator side channel: client connection plus the context object
//! passed to the module.

pub mod client;
mod context;

pub use client::OrchestratorClient;
pub use context::{AddServiceArgs, EndpointWait, NetworkContext, ServiceInfo};
