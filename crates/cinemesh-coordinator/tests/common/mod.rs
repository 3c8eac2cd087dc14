//! Shared scaffolding for the end-to-end tests: a real coordinator on a
//! loopback port, plus dataset and polling helpers.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use cinemesh_core::ratings::UserRatings;

use cinemesh_coordinator::dispatcher::Dispatcher;
use cinemesh_coordinator::registry::WorkerRegistry;
use cinemesh_coordinator::server::TcpServer;

pub struct TestCoordinator {
    pub addr: SocketAddr,
    pub registry: Arc<WorkerRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown: broadcast::Sender<()>,
}

/// Boot a coordinator on an ephemeral loopback port with `k = 30`.
pub async fn spawn_coordinator(result_timeout: Duration) -> TestCoordinator {
    let (shutdown, _) = broadcast::channel(4);
    let registry = Arc::new(WorkerRegistry::new());
    let (server, inbound_rx) = TcpServer::new(registry.clone(), shutdown.clone());
    let dispatcher = Dispatcher::new(registry.clone(), result_timeout, 30, shutdown.clone());
    dispatcher.spawn_router(inbound_rx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.run(listener));

    TestCoordinator {
        addr,
        registry,
        dispatcher,
        shutdown,
    }
}

/// Build a ratings map from literal `(user, [(movie, rating)])` rows.
pub fn ratings(rows: &[(u32, &[(u32, f64)])]) -> UserRatings {
    rows.iter()
        .map(|(user, pairs)| (*user, pairs.iter().copied().collect()))
        .collect()
}

/// Poll `condition` every 10 ms for up to two seconds.
pub async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
