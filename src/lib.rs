//! # Module Harness
//!
//! Hosts a single pluggable module inside an isolated process and exposes its
//! entry point to an orchestrator over RPC:
//! - Required startup values read once from the process environment
//! - Module construction through an injected [`ModuleFactory`]
//! - A [`NetworkContext`] connection back to the orchestrator's control API
//! - One `Execute` RPC forwarding to the module
//! - Drain-then-stop shutdown on SIGINT/SIGTERM
//!
//! ## Startup
//!
//! ```text
//!   env(params) ─→ ModuleFactory::create ─→ env(socket) ─→ NetworkContext
//!                                                              │
//!          ModuleServer ◀── register ModuleService(module, ctx)┘
//!   Unstarted → Listening → Draining → Stopped
//! ```
//!
//! ```no_run
//! use module_harness::{EchoModuleFactory, HarnessConfig, ModuleExecutor};
//!
//! # async fn example() -> module_harness::Result<()> {
//! let mut config = HarnessConfig::default();
//! config.orchestrator.allow_insecure_transport = true;
//! ModuleExecutor::new(Box::new(EchoModuleFactory), config).run().await
//! # }
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod env;
pub mod executor;
pub mod ipc;
pub mod module;
pub mod network;
pub mod service;
pub mod shutdown;
pub mod types;

// Internal utilities
pub mod observability;

pub use executor::ModuleExecutor;
pub use ipc::{ModuleServer, ServerState};
pub use module::{EchoModule, EchoModuleFactory, ExecutableModule, ModuleFactory};
pub use network::NetworkContext;
pub use service::{ModuleService, RpcService};
pub use types::{Error, HarnessConfig, ModuleError, Result};
