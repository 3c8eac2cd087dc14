//! /status, /workers, and /neighbors handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use cinemesh_core::message::UserId;
use cinemesh_coordinator::recommend::{Recommender, merge_neighbors};
use cinemesh_coordinator::registry::{WorkerRegistry, WorkerState};

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<WorkerRegistry>,
    pub recommender: Arc<Recommender>,
    /// Users in the loaded dataset.
    pub dataset_users: usize,
    pub started_at: Instant,
    /// Neighbor cap applied to the merged answer.
    pub k: usize,
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub dataset_users: usize,
    pub workers: WorkerCounts,
}

#[derive(Serialize)]
pub struct WorkerCounts {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let snapshot = state.registry.snapshot();
    let idle = snapshot
        .iter()
        .filter(|w| w.state == WorkerState::Idle)
        .count();
    let busy = snapshot
        .iter()
        .filter(|w| w.state == WorkerState::Busy)
        .count();

    Json(StatusResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        dataset_users: state.dataset_users,
        workers: WorkerCounts {
            total: snapshot.len(),
            idle,
            busy,
        },
    })
}

// ── /workers ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct WorkersResponse {
    pub workers: Vec<WorkerInfo>,
}

#[derive(Serialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub addr: String,
    pub state: String,
    pub concurrency: usize,
    pub last_seen_secs: u64,
}

pub async fn handle_workers(State(state): State<ApiState>) -> Json<WorkersResponse> {
    let mut workers: Vec<WorkerInfo> = state
        .registry
        .snapshot()
        .into_iter()
        .map(|w| WorkerInfo {
            worker_id: w.id,
            addr: w.addr.to_string(),
            state: format!("{:?}", w.state),
            concurrency: w.concurrency,
            last_seen_secs: w.last_seen.elapsed().as_secs(),
        })
        .collect();
    workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

    Json(WorkersResponse { workers })
}

// ── /neighbors/{user_id} ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct NeighborsResponse {
    pub user_id: UserId,
    /// Blocks sent to workers. Fewer neighbor sources than this means some
    /// blocks timed out.
    pub dispatched_blocks: usize,
    pub completed_blocks: usize,
    pub neighbors: Vec<NeighborInfo>,
}

#[derive(Serialize)]
pub struct NeighborInfo {
    pub id: String,
    pub similarity: f64,
}

pub async fn handle_neighbors(
    State(state): State<ApiState>,
    Path(user_id): Path<UserId>,
) -> Json<NeighborsResponse> {
    let outcome = state.recommender.trigger_dispatch(user_id).await;

    let neighbors = merge_neighbors(&outcome.results, state.k)
        .into_iter()
        .map(|n| NeighborInfo {
            id: n.id,
            similarity: n.similarity,
        })
        .collect();

    Json(NeighborsResponse {
        user_id,
        dispatched_blocks: outcome.dispatched,
        completed_blocks: outcome.results.len(),
        neighbors,
    })
}
