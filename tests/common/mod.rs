//! Shared fixtures: a scripted orchestrator and frame helpers.

#![allow(dead_code)]

use module_harness::ipc::codec::{
    decode, encode, read_frame, write_frame, RequestFrame, ResponseFrame, MSG_REQUEST,
};
use module_harness::types::EnvVarNames;
use module_harness::HarnessConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// In-process stand-in for the orchestrator API.
pub struct FakeOrchestrator {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<RequestFrame>>>,
}

impl FakeOrchestrator {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let conn_count = connections.clone();
        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                conn_count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_orchestrator_connection(stream, seen.clone()));
            }
        });

        Self {
            addr,
            connections,
            requests,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve_orchestrator_connection(mut stream: TcpStream, seen: Arc<Mutex<Vec<RequestFrame>>>) {
    while let Ok(Some((_, payload))) = read_frame(&mut stream, 1024 * 1024).await {
        let request: RequestFrame = decode(&payload).unwrap();
        seen.lock().await.push(request.clone());

        let service_id = request
            .body
            .get("service_id")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let response = match request.method.as_str() {
            "AddService" => ResponseFrame::success(
                request.id.clone(),
                serde_json::json!({
                    "service_id": service_id,
                    "ip_address": "172.17.0.5",
                    "used_ports": request.body.get("used_ports").cloned().unwrap_or_default(),
                }),
            ),
            "GetServiceInfo" if service_id == "missing" => ResponseFrame::failure(
                request.id.clone(),
                "NOT_FOUND",
                "no service with ID 'missing'",
            ),
            "GetServiceInfo" => ResponseFrame::success(
                request.id.clone(),
                serde_json::json!({
                    "service_id": service_id,
                    "ip_address": "172.17.0.9",
                }),
            ),
            "GetServices" => ResponseFrame::success(
                request.id.clone(),
                serde_json::json!({ "service_ids": ["datastore", "api"] }),
            ),
            "RemoveService" | "WaitForHttpGetEndpointAvailability" => {
                ResponseFrame::success(request.id.clone(), serde_json::json!({}))
            }
            other => ResponseFrame::failure(request.id.clone(), "NOT_FOUND", format!("Unknown method: {}", other)),
        };
        let encoded = encode(&response).unwrap();
        if write_frame(&mut stream, response.msg_type(), &encoded).await.is_err() {
            break;
        }
    }
}

/// Config bound to loopback on an ephemeral port with per-test env var names.
pub fn test_config(test: &str) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.env = EnvVarNames {
        serialized_params: format!("HARNESS_IT_{}_PARAMS", test),
        orchestrator_socket: format!("HARNESS_IT_{}_SOCKET", test),
    };
    config.server.listen_host = "127.0.0.1".to_string();
    config.server.shutdown_grace_period = Duration::from_secs(2);
    config.api.listen_port = 0;
    config.orchestrator.allow_insecure_transport = true;
    config
}

/// Send an `Execute` call and wait for its response frame.
pub async fn execute(stream: &mut TcpStream, params: &str) -> (u8, ResponseFrame) {
    call(
        stream,
        "ModuleService",
        "Execute",
        serde_json::json!({ "params_json": params }),
    )
    .await
}

pub async fn call(
    stream: &mut TcpStream,
    service: &str,
    method: &str,
    body: serde_json::Value,
) -> (u8, ResponseFrame) {
    let request = RequestFrame {
        id: "test-1".to_string(),
        service: service.to_string(),
        method: method.to_string(),
        body,
    };
    write_frame(stream, MSG_REQUEST, &encode(&request).unwrap())
        .await
        .unwrap();

    let (msg_type, payload) = read_frame(stream, 1024 * 1024).await.unwrap().unwrap();
    (msg_type, decode(&payload).unwrap())
}
