//! Echo module — runs the harness with a module that returns its params.
//!
//! Reads `SERIALIZED_CUSTOM_PARAMS` (must be JSON) and `ORCHESTRATOR_SOCKET`
//! from the environment, then serves `ModuleService.Execute` until SIGINT or
//! SIGTERM.

use clap::Parser;
use std::path::PathBuf;

use module_harness::observability::{init_tracing, LogFormat};
use module_harness::{EchoModuleFactory, HarnessConfig, ModuleExecutor};

#[derive(Debug, Parser)]
#[command(name = "echo-module", version, about = "Serve an echo module to the orchestrator")]
struct Args {
    /// JSON harness configuration; defaults apply to anything omitted.
    #[arg(long, env = "HARNESS_CONFIG")]
    config: Option<PathBuf>,

    /// Permit a plain TCP connection to the orchestrator.
    #[arg(long, env = "HARNESS_INSECURE_ORCHESTRATOR")]
    insecure_orchestrator: bool,

    /// Log format (compact or json).
    #[arg(long, env = "HARNESS_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_json_file(path)?,
        None => HarnessConfig::default(),
    };
    if args.insecure_orchestrator {
        config.orchestrator.allow_insecure_transport = true;
    }

    tracing::info!(
        "🚀 Echo module starting ({} on port {})",
        config.api.service_name,
        config.api.listen_port
    );

    if let Err(e) = ModuleExecutor::new(Box::new(EchoModuleFactory), config).run().await {
        tracing::error!("Module harness exited with error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
