//! End-to-end dispatch: real coordinator, real workers, loopback TCP.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;

use cinemesh_coordinator::registry::WorkerState;
use cinemesh_worker::WorkerClient;

use common::{ratings, spawn_coordinator, wait_until};

/// Connect a real worker and leave it serving tasks in the background.
async fn attach_worker(coordinator: &common::TestCoordinator) -> String {
    let client = WorkerClient::connect(&coordinator.addr.to_string())
        .await
        .expect("worker should connect and handshake");
    let id = client.id().to_string();
    assert!(!id.is_empty(), "ACK must carry a non-empty worker_id");
    tokio::spawn(client.run(coordinator.shutdown.subscribe()));
    id
}

#[tokio::test]
async fn empty_pool_dispatch_is_a_noop() {
    let coordinator = spawn_coordinator(Duration::from_secs(5)).await;
    let data = ratings(&[(1, &[(10, 4.0)]), (2, &[(10, 3.5)])]);

    let (results_tx, mut results_rx) = mpsc::channel(16);
    let dispatched = coordinator.dispatcher.run(1, &data, results_tx).await;

    assert_eq!(dispatched, 0);
    // No waiters were spawned, so the channel closes without ever carrying
    // an item.
    assert!(results_rx.recv().await.is_none());
}

#[tokio::test]
async fn single_worker_processes_both_candidates() {
    let coordinator = spawn_coordinator(Duration::from_secs(5)).await;
    let worker_id = attach_worker(&coordinator).await;
    wait_until("worker registered", || coordinator.registry.len() == 1).await;

    let data = ratings(&[
        (1, &[(10, 5.0), (20, 4.0)]),
        (2, &[(10, 4.0), (30, 2.0)]),
        (3, &[(10, 3.0), (20, 5.0)]),
    ]);

    let (results_tx, mut results_rx) = mpsc::channel(16);
    let dispatched = coordinator.dispatcher.run(1, &data, results_tx).await;
    assert_eq!(dispatched, 1);

    let result = tokio::time::timeout(Duration::from_secs(2), results_rx.recv())
        .await
        .expect("result should arrive well before the deadline")
        .expect("exactly one result expected");

    assert_eq!(result.job_id, worker_id);
    assert_eq!(result.block_id.start_id, 0);
    assert_eq!(result.block_id.end_id, 1);

    // User 3 shares two movies with the target, user 2 only one.
    assert_eq!(result.neighbors.len(), 2);
    assert_eq!(result.neighbors[0].id, "3");
    assert_eq!(result.neighbors[1].id, "2");
    assert!(result.neighbors[0].similarity > result.neighbors[1].similarity);
    assert!(result.neighbors.iter().all(|n| n.similarity > 0.0));

    // No second result ever shows up.
    assert!(results_rx.recv().await.is_none());

    wait_until("worker idle again", || {
        coordinator.registry.state(&worker_id) == Some(WorkerState::Idle)
    })
    .await;
}

#[tokio::test]
async fn three_workers_split_ten_candidates_evenly() {
    let coordinator = spawn_coordinator(Duration::from_secs(5)).await;
    for _ in 0..3 {
        attach_worker(&coordinator).await;
    }
    wait_until("three workers registered", || coordinator.registry.len() == 3).await;

    // Target user 1 plus candidates 2..=11.
    let rows: Vec<(u32, Vec<(u32, f64)>)> =
        (1..=11).map(|u| (u, vec![(100, 1.0), (u, 2.0)])).collect();
    let borrowed: Vec<(u32, &[(u32, f64)])> =
        rows.iter().map(|(u, r)| (*u, r.as_slice())).collect();
    let data = ratings(&borrowed);

    let (results_tx, mut results_rx) = mpsc::channel(16);
    let dispatched = coordinator.dispatcher.run(1, &data, results_tx).await;
    assert_eq!(dispatched, 3);

    let mut blocks = Vec::new();
    for _ in 0..3 {
        let result = tokio::time::timeout(Duration::from_secs(2), results_rx.recv())
            .await
            .expect("all three blocks should answer")
            .expect("channel should not close early");
        blocks.push(result.block_id);
    }

    // Balanced split of 10 candidates: sizes 4, 3, 3.
    let mut sizes: Vec<usize> = blocks.iter().map(|b| b.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![3, 3, 4]);

    // Disjoint cover of [0, 9].
    let mut covered = HashSet::new();
    for block in &blocks {
        for idx in block.start_id..=block.end_id {
            assert!(covered.insert(idx), "index {idx} assigned twice");
        }
    }
    assert_eq!(covered, (0..10).collect::<HashSet<_>>());
}

#[tokio::test]
async fn consecutive_dispatches_reuse_the_pool() {
    let coordinator = spawn_coordinator(Duration::from_secs(5)).await;
    let worker_id = attach_worker(&coordinator).await;
    wait_until("worker registered", || coordinator.registry.len() == 1).await;

    let data = ratings(&[(1, &[(10, 5.0)]), (2, &[(10, 4.0)])]);

    for round in 0..3 {
        wait_until("worker idle", || {
            coordinator.registry.state(&worker_id) == Some(WorkerState::Idle)
        })
        .await;

        let (results_tx, mut results_rx) = mpsc::channel(4);
        let dispatched = coordinator.dispatcher.run(1, &data, results_tx).await;
        assert_eq!(dispatched, 1, "round {round}");

        let result = tokio::time::timeout(Duration::from_secs(2), results_rx.recv())
            .await
            .expect("result should arrive")
            .expect("one result per round");
        assert_eq!(result.neighbors.len(), 1);
        assert_eq!(result.neighbors[0].id, "2");
    }
}

#[tokio::test]
async fn disconnected_worker_leaves_the_pool() {
    let coordinator = spawn_coordinator(Duration::from_secs(5)).await;

    let client = WorkerClient::connect(&coordinator.addr.to_string())
        .await
        .expect("worker should connect");
    wait_until("worker registered", || coordinator.registry.len() == 1).await;

    drop(client);
    wait_until("worker deregistered", || coordinator.registry.is_empty()).await;

    // Dispatch after the disconnect sees an empty pool.
    let data = ratings(&[(1, &[(10, 5.0)]), (2, &[(10, 4.0)])]);
    let (results_tx, _results_rx) = mpsc::channel(4);
    assert_eq!(coordinator.dispatcher.run(1, &data, results_tx).await, 0);
}
