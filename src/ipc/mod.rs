//! TCP+msgpack RPC transport.
//!
//! Length-prefixed msgpack framing shared by the module server and the
//! orchestrator client.

pub mod codec;
pub mod server;

pub use server::{ModuleServer, ServerState};
