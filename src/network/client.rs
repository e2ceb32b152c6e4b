//! Client for the orchestrator control API.
//!
//! One TCP connection per process, shared by every concurrent module
//! invocation. A writer task owns the write half and sends whole frames; a
//! reader task owns the read half and routes each response to its caller by
//! request id. Callers never touch the socket, so a call that times out or
//! is dropped cannot leave a half-written request or a half-read response
//! behind.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::ipc::codec::{
    decode, encode, read_frame, write_frame, ErrorBody, RequestFrame, ResponseFrame, MSG_ERROR,
    MSG_REQUEST, MSG_RESPONSE,
};
use crate::types::{Error, OrchestratorConfig, Result};

/// Service name the orchestrator API is registered under.
pub const ORCHESTRATOR_SERVICE: &str = "api_container";

type PendingCalls = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseFrame>>>>;

#[derive(Debug)]
pub struct OrchestratorClient {
    addr: String,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pending: PendingCalls,
    /// Cancelled once the connection is unusable or the client is dropped.
    closed: CancellationToken,
    request_timeout: Duration,
}

impl OrchestratorClient {
    /// Dial the orchestrator. No retry: a failure here is fatal to startup.
    pub async fn connect(
        addr: &str,
        config: &OrchestratorConfig,
        max_frame_bytes: u32,
    ) -> Result<Self> {
        if !config.allow_insecure_transport {
            return Err(Error::InsecureTransport {
                addr: addr.to_string(),
            });
        }
        tracing::warn!("Dialling orchestrator at {} without transport security", addr);

        let stream = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(Error::Connection {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_elapsed) => {
                return Err(Error::Connection {
                    addr: addr.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("no connection within {:?}", config.connect_timeout),
                    ),
                })
            }
        };
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending = PendingCalls::default();
        let closed = CancellationToken::new();

        tokio::spawn(write_requests(write_half, outbound_rx, closed.clone()));
        tokio::spawn(route_responses(
            read_half,
            pending.clone(),
            closed.clone(),
            max_frame_bytes,
        ));

        Ok(Self {
            addr: addr.to_string(),
            outbound,
            pending,
            closed,
            request_timeout: config.request_timeout,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Issue one request against the orchestrator API and return its body.
    ///
    /// `request_timeout` bounds the whole call, including any wait behind
    /// other callers.
    pub async fn call(&self, method: &str, body: Value) -> Result<Value> {
        if self.closed.is_cancelled() {
            return Err(self.connection_lost());
        }
        let request = RequestFrame {
            id: uuid::Uuid::new_v4().to_string(),
            service: ORCHESTRATOR_SERVICE.to_string(),
            method: method.to_string(),
            body,
        };
        let payload = encode(&request)?;

        let response =
            match tokio::time::timeout(self.request_timeout, self.round_trip(&request.id, payload))
                .await
            {
                Ok(response) => response?,
                Err(_elapsed) => {
                    self.pending.lock().await.remove(&request.id);
                    return Err(Error::timeout(format!(
                        "orchestrator call {} exceeded {:?}",
                        method, self.request_timeout
                    )));
                }
            };

        if response.ok {
            return Ok(response.body.unwrap_or(Value::Null));
        }
        let error = response.error.unwrap_or_else(|| ErrorBody {
            code: "UNKNOWN".to_string(),
            message: "error frame without detail".to_string(),
        });
        Err(Error::Orchestrator {
            code: error.code,
            message: error.message,
        })
    }

    async fn round_trip(&self, request_id: &str, payload: Vec<u8>) -> Result<ResponseFrame> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.to_string(), reply_tx);

        // The reader cancels before clearing the pending map, so a call
        // registered after the clear is caught here.
        if self.closed.is_cancelled() || self.outbound.send(payload).is_err() {
            self.pending.lock().await.remove(request_id);
            return Err(self.connection_lost());
        }
        reply_rx.await.map_err(|_| self.connection_lost())
    }

    fn connection_lost(&self) -> Error {
        Error::Connection {
            addr: self.addr.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "orchestrator connection closed",
            ),
        }
    }
}

impl Drop for OrchestratorClient {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn write_requests(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            _ = closed.cancelled() => return,
            next = outbound.recv() => match next {
                Some(payload) => payload,
                None => return,
            },
        };
        if let Err(e) = write_frame(&mut writer, MSG_REQUEST, &payload).await {
            tracing::warn!("Orchestrator connection write failed: {}", e);
            closed.cancel();
            return;
        }
    }
}

async fn route_responses(
    mut reader: OwnedReadHalf,
    pending: PendingCalls,
    closed: CancellationToken,
    max_frame_bytes: u32,
) {
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = read_frame(&mut reader, max_frame_bytes) => frame,
        };
        let (msg_type, bytes) = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::warn!("Orchestrator closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!("Orchestrator connection read failed: {}", e);
                break;
            }
        };
        if msg_type != MSG_RESPONSE && msg_type != MSG_ERROR {
            tracing::warn!("Unexpected message type from orchestrator: 0x{:02X}", msg_type);
            continue;
        }
        let response: ResponseFrame = match decode(&bytes) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Undecodable orchestrator response: {}", e);
                continue;
            }
        };
        match pending.lock().await.remove(&response.id) {
            Some(reply) => {
                let _ = reply.send(response);
            }
            // Late answer to a call that already timed out.
            None => tracing::debug!("Discarding stale orchestrator response {}", response.id),
        }
    }

    closed.cancel();
    // Dropping the senders fails every caller still waiting.
    pending.lock().await.clear();
}
