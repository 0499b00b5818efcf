//! Shared utilities for lifecycle integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use service_core::config::ServiceConfig;
use service_core::http::ServiceHandle;
use service_core::lifecycle::{LifecycleController, ServiceState};
use service_core::observability::MemorySink;

/// Build a controller on an ephemeral local port, recording its log events.
pub fn controller(name: &str, router: Router) -> (LifecycleController, Arc<MemorySink>) {
    controller_with(ServiceConfig::new(name, "127.0.0.1:0"), router)
}

pub fn controller_with(config: ServiceConfig, router: Router) -> (LifecycleController, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let handle = ServiceHandle::new(config, router).expect("valid test config");
    (LifecycleController::new(handle, sink.clone()), sink)
}

/// HTTP client that never reuses connections across requests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// GET `path` on `addr`, returning the status code.
pub async fn get_status(addr: SocketAddr, path: &str) -> reqwest::Result<u16> {
    let res = client().get(format!("http://{}{}", addr, path)).send().await?;
    Ok(res.status().as_u16())
}

/// Whether a fresh TCP connection to `addr` is accepted.
pub async fn accepts_connections(addr: SocketAddr) -> bool {
    tokio::net::TcpStream::connect(addr).await.is_ok()
}

/// Poll until the controller reaches `state` or `timeout` passes.
#[allow(dead_code)]
pub async fn wait_for_state(controller: &LifecycleController, state: ServiceState, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if controller.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    controller.state() == state
}
