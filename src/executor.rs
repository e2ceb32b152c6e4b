//! Bootstrap sequence: environment → module → orchestrator connection →
//! service registration → server run.
//!
//! Every startup step is sequential and fatal on failure; nothing is bound
//! until the module and network context exist.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::env;
use crate::ipc::{ModuleServer, ServerState};
use crate::module::ModuleFactory;
use crate::network::NetworkContext;
use crate::service::ModuleService;
use crate::types::{Error, HarnessConfig, Result};

const SERIALIZED_PARAMS_DESCRIPTION: &str = "the serialized custom params that the module will consume";
const ORCHESTRATOR_SOCKET_DESCRIPTION: &str = "the socket value used in the orchestrator connection";

/// Runs one module for the lifetime of the process.
pub struct ModuleExecutor {
    factory: Box<dyn ModuleFactory>,
    config: HarnessConfig,
    state: Arc<watch::Sender<ServerState>>,
}

impl std::fmt::Debug for ModuleExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleExecutor")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ModuleExecutor {
    pub fn new(factory: Box<dyn ModuleFactory>, config: HarnessConfig) -> Self {
        let (state, _) = watch::channel(ServerState::Unstarted);
        Self {
            factory,
            config,
            state: Arc::new(state),
        }
    }

    /// Observe the server lifecycle. Stays `Unstarted` if startup fails.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Start up and serve until SIGINT/SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(crate::shutdown::shutdown_signal()).await
    }

    /// Start up and serve until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let env_names = &self.config.env;

        let serialized_params =
            env::resolve(&env_names.serialized_params, SERIALIZED_PARAMS_DESCRIPTION)?;

        let module = self
            .factory
            .create(&serialized_params)
            .map_err(Error::Factory)?;
        tracing::info!("Module created from serialized params");

        let orchestrator_socket =
            env::resolve(&env_names.orchestrator_socket, ORCHESTRATOR_SOCKET_DESCRIPTION)?;

        let network_ctx = NetworkContext::connect(
            &orchestrator_socket,
            self.config.server.execution_volume_mountpoint.clone(),
            &self.config.orchestrator,
            &self.config.ipc,
        )
        .await?;
        tracing::info!("Connected to orchestrator at {}", orchestrator_socket);

        let service = ModuleService::new(module, Arc::new(network_ctx), &self.config.api);

        ModuleServer::from_config(&self.config)
            .with_state_sender(self.state.clone())
            .add_service(Arc::new(service))
            .run_until(shutdown)
            .await
    }
}
