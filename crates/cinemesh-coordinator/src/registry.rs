//! Worker registry — tracks connected workers, their state, and their
//! send queues.
//!
//! Keyed on the server-assigned worker ID. The connection handler stores
//! only its own ID and goes through the registry for everything else, so
//! there are no back-pointers between connections and records. Entries are
//! created on a successful handshake and removed when the connection dies.

use std::net::SocketAddr;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;

use cinemesh_core::message::Message;

/// Capacity of each worker's outbound send queue. A full queue fails the
/// assignment instead of blocking the dispatcher on a slow worker.
pub const SEND_QUEUE_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
    Disconnected,
}

/// One registered worker.
#[derive(Debug)]
pub struct WorkerEntry {
    pub id: String,
    pub addr: SocketAddr,
    /// Task slots advertised in the HELLO.
    pub concurrency: usize,
    pub state: WorkerState,
    /// Refreshed on every decoded frame from this worker.
    pub last_seen: Instant,
    /// Frames queued for the connection's writer task.
    pub sender: mpsc::Sender<Message>,
}

/// Point-in-time copy of a worker's record, for status reporting.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub id: String,
    pub addr: SocketAddr,
    pub concurrency: usize,
    pub state: WorkerState,
    pub last_seen: Instant,
}

/// The registry proper. Iteration copies entries out — no caller ever
/// holds a shard lock across I/O.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: DashMap<String, WorkerEntry>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: WorkerEntry) {
        self.workers.insert(entry.id.clone(), entry);
    }

    /// Remove a worker, marking the record disconnected on the way out.
    pub fn remove(&self, id: &str) -> Option<WorkerEntry> {
        self.workers.remove(id).map(|(_, mut entry)| {
            entry.state = WorkerState::Disconnected;
            entry
        })
    }

    /// IDs of every worker idle at call time. A copy — the pool can change
    /// the moment this returns.
    pub fn snapshot_idle(&self) -> Vec<String> {
        self.workers
            .iter()
            .filter(|entry| entry.state == WorkerState::Idle)
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// Transition a worker's state. Returns false for unknown IDs.
    pub fn set_state(&self, id: &str, state: WorkerState) -> bool {
        match self.workers.get_mut(id) {
            Some(mut entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    pub fn state(&self, id: &str) -> Option<WorkerState> {
        self.workers.get(id).map(|entry| entry.state)
    }

    /// Refresh the last-seen stamp.
    pub fn mark_seen(&self, id: &str) {
        if let Some(mut entry) = self.workers.get_mut(id) {
            entry.last_seen = Instant::now();
        }
    }

    /// The worker's send queue, cloned out so no lock outlives this call.
    pub fn sender(&self, id: &str) -> Option<mpsc::Sender<Message>> {
        self.workers.get(id).map(|entry| entry.sender.clone())
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Copies of every record, for the status API.
    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.workers
            .iter()
            .map(|entry| WorkerSnapshot {
                id: entry.id.clone(),
                addr: entry.addr,
                concurrency: entry.concurrency,
                state: entry.state,
                last_seen: entry.last_seen,
            })
            .collect()
    }
}
