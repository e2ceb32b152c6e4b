//! TCP module server — registration, accept loop, per-connection handler and
//! drain-then-stop shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::ipc::codec::{
    decode, encode, read_frame, write_frame, RequestFrame, ResponseFrame, MSG_ERROR, MSG_REQUEST,
};
use crate::service::RpcService;
use crate::types::{Error, HarnessConfig, IpcConfig, ListenProtocol, Result};

/// Lifecycle of a [`ModuleServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unstarted,
    /// Accepting connections on the given local address.
    Listening(SocketAddr),
    /// Listener closed; in-flight calls finishing.
    Draining,
    Stopped,
}

type Router = HashMap<String, Arc<dyn RpcService>>;

/// Server hosting the registered RPC services.
pub struct ModuleServer {
    listen_host: String,
    listen_port: u16,
    protocol: ListenProtocol,
    grace_period: Duration,
    ipc_config: IpcConfig,
    services: Vec<Arc<dyn RpcService>>,
    state: Arc<watch::Sender<ServerState>>,
}

impl std::fmt::Debug for ModuleServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleServer")
            .field("listen_host", &self.listen_host)
            .field("listen_port", &self.listen_port)
            .field("protocol", &self.protocol)
            .field("grace_period", &self.grace_period)
            .field("services", &self.services.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl ModuleServer {
    pub fn new(
        listen_host: impl Into<String>,
        listen_port: u16,
        protocol: ListenProtocol,
        grace_period: Duration,
        ipc_config: IpcConfig,
    ) -> Self {
        let (state, _) = watch::channel(ServerState::Unstarted);
        Self {
            listen_host: listen_host.into(),
            listen_port,
            protocol,
            grace_period,
            ipc_config,
            services: Vec::new(),
            state: Arc::new(state),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            config.server.listen_host.clone(),
            config.api.listen_port,
            config.api.listen_protocol,
            config.server.shutdown_grace_period,
            config.ipc.clone(),
        )
    }

    /// Publish lifecycle transitions on an externally owned channel.
    pub fn with_state_sender(mut self, state: Arc<watch::Sender<ServerState>>) -> Self {
        self.state = state;
        self
    }

    /// Queue a service for registration when the server starts.
    pub fn add_service(mut self, service: Arc<dyn RpcService>) -> Self {
        self.services.push(service);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Serve until SIGINT/SIGTERM, then drain.
    pub async fn run(self) -> Result<()> {
        self.run_until(crate::shutdown::shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain.
    ///
    /// Registration and bind failures return before anything is served and
    /// leave the state at `Unstarted`.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let router = Arc::new(self.build_router()?);
        let listener = self.bind().await?;
        let local_addr = listener.local_addr()?;

        let conn_semaphore = Arc::new(Semaphore::new(self.ipc_config.max_connections));
        let cancel = CancellationToken::new();
        let mut connections = JoinSet::new();

        self.state.send_replace(ServerState::Listening(local_addr));
        tracing::info!(
            "Module server listening on {}/{} (max_connections={})",
            local_addr,
            self.protocol,
            self.ipc_config.max_connections,
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, draining module server");
                    break;
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!("Connection task ended abnormally: {}", e);
                    }
                }
                accept = listener.accept() => {
                    let (stream, peer) = match accept {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };

                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                "Connection from {} rejected: at max_connections ({})",
                                peer,
                                self.ipc_config.max_connections,
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!("Connection from {} (active={})",
                        peer,
                        self.ipc_config.max_connections - conn_semaphore.available_permits(),
                    );
                    let router = router.clone();
                    let cancel = cancel.clone();
                    let ipc_config = self.ipc_config.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, router, cancel, ipc_config, permit).await {
                            tracing::warn!("Connection from {} error: {}", peer, e);
                        }
                    });
                }
            }
        }

        drop(listener);
        self.state.send_replace(ServerState::Draining);
        cancel.cancel();

        let drained = tokio::time::timeout(self.grace_period, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "{} connection(s) still busy after {:?} grace period, closing them",
                connections.len(),
                self.grace_period,
            );
            connections.shutdown().await;
        }

        self.state.send_replace(ServerState::Stopped);
        tracing::info!("Module server stopped");
        Ok(())
    }

    fn build_router(&self) -> Result<Router> {
        let mut router = Router::new();
        for service in &self.services {
            let name = service.name().to_string();
            if name.is_empty() {
                return Err(Error::registration("service name must not be empty"));
            }
            if router.contains_key(&name) {
                return Err(Error::registration(format!(
                    "service '{}' registered more than once",
                    name
                )));
            }
            tracing::info!("  ✓ {}: {}", name, service.methods().join(", "));
            router.insert(name, service.clone());
        }
        if router.is_empty() {
            return Err(Error::registration("no services registered"));
        }
        Ok(router)
    }

    async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.listen_host, self.listen_port);
        match self.protocol {
            ListenProtocol::Tcp => TcpListener::bind(&addr)
                .await
                .map_err(|source| Error::Bind { addr, source }),
        }
    }
}

/// Handle a single TCP connection: read frames → dispatch → write responses.
///
/// Cancellation is only observed between calls, so a call that has been
/// read always gets its response written.
async fn handle_connection(
    stream: TcpStream,
    router: Arc<Router>,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
    _permit: OwnedSemaphorePermit, // held for connection lifetime
) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();
    let read_timeout = Duration::from_secs(ipc_config.read_timeout_secs);
    let write_timeout = Duration::from_secs(ipc_config.write_timeout_secs);

    loop {
        let (msg_type, payload) = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame_result = tokio::time::timeout(read_timeout, read_frame(&mut reader, ipc_config.max_frame_bytes)) => {
                match frame_result {
                    Err(_elapsed) => {
                        tracing::debug!("Read timeout ({}s), dropping connection", ipc_config.read_timeout_secs);
                        break;
                    }
                    Ok(result) => match result? {
                        Some(frame) => frame,
                        None => break, // clean EOF
                    },
                }
            }
        };

        let response = dispatch(&router, msg_type, &payload).await;
        let encoded = encode(&response).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        timed_write(&mut writer, response.msg_type(), &encoded, write_timeout).await?;
    }

    Ok(())
}

/// Decode one request frame and route it to its service.
async fn dispatch(router: &Router, msg_type: u8, payload: &[u8]) -> ResponseFrame {
    if msg_type != MSG_REQUEST {
        return ResponseFrame::failure(
            "",
            "INVALID_ARGUMENT",
            format!("Unexpected message type: 0x{:02X}", msg_type),
        );
    }

    let request: RequestFrame = match decode(payload) {
        Ok(request) => request,
        Err(e) => {
            return ResponseFrame::failure("", "INVALID_ARGUMENT", format!("Invalid msgpack: {}", e))
        }
    };

    let Some(service) = router.get(&request.service) else {
        let err = Error::not_found(format!("Unknown service: {}", request.service));
        return ResponseFrame::from_error(request.id, &err);
    };

    tracing::debug!("Dispatching {}.{} (id={})", request.service, request.method, request.id);
    match service.call(&request.method, request.body).await {
        Ok(body) => ResponseFrame::success(request.id, body),
        Err(e) => {
            tracing::debug!("{}.{} failed: {}", request.service, request.method, e);
            ResponseFrame::from_error(request.id, &e)
        }
    }
}

/// Write a frame with a timeout. Returns an error if the write takes too long
/// (prevents slow consumers from holding connections indefinitely).
async fn timed_write<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
    timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(timeout, write_frame(writer, msg_type, payload))
        .await
        .map_err(|_| {
            tracing::warn!("Write timeout ({}s), dropping connection", timeout.as_secs());
            std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
        })?
}
