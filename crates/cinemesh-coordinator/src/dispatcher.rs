//! Dispatcher — partitions a target computation across idle workers and
//! correlates results back through per-job channels.
//!
//! One dispatch call snapshots the idle pool, splits the candidate user
//! list into contiguous blocks, sends one TASK per block, and spawns a
//! waiter per assignment. Results are routed by worker ID — a worker has
//! at most one outstanding task, so its ID doubles as the job ID. A block
//! either produces exactly one result on the caller's channel or times
//! out silently; the caller observes the shortfall against the returned
//! dispatch count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use cinemesh_core::message::{Block, BlockResult, Message, Task, UserId};
use cinemesh_core::ratings::UserRatings;

use crate::registry::{WorkerRegistry, WorkerState};
use crate::server::Envelope;

/// Per-assignment result deadline when none is configured.
pub const DEFAULT_RESULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Pending assignments: worker ID → the slot its RESULT will be routed to.
/// Locked only around insert/remove, never across a send or any I/O.
type PendingResults = Arc<Mutex<HashMap<String, oneshot::Sender<BlockResult>>>>;

pub struct Dispatcher {
    registry: Arc<WorkerRegistry>,
    pending: PendingResults,
    result_timeout: Duration,
    /// Neighbors requested per block, stamped into every TASK.
    k: usize,
    shutdown: broadcast::Sender<()>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        result_timeout: Duration,
        k: usize,
        shutdown: broadcast::Sender<()>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            pending: Arc::new(Mutex::new(HashMap::new())),
            result_timeout,
            k,
            shutdown,
        })
    }

    /// Start the long-lived router consuming the server's inbound queue.
    pub fn spawn_router(self: &Arc<Self>, mut inbound: mpsc::Receiver<Envelope>) -> JoinHandle<()> {
        let dispatcher = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("inbound router shutting down");
                        return;
                    }
                    envelope = inbound.recv() => {
                        let Some(envelope) = envelope else { return };
                        dispatcher.route(envelope).await;
                    }
                }
            }
        })
    }

    /// Deliver one inbound envelope. RESULT frames land in their pending
    /// slot; a missing slot means the assignment already timed out and the
    /// result is dropped. Everything else has no routing — heartbeats were
    /// already accounted for by the server's last-seen refresh.
    async fn route(&self, envelope: Envelope) {
        match envelope.message {
            Message::Result(result) => {
                let slot = self.pending.lock().await.remove(&envelope.worker_id);
                match slot {
                    Some(tx) => {
                        if tx.send(result).is_err() {
                            tracing::debug!(
                                worker_id = %envelope.worker_id,
                                "waiter already gone, result dropped"
                            );
                        }
                    }
                    None => {
                        tracing::debug!(
                            worker_id = %envelope.worker_id,
                            job_id = %result.job_id,
                            "no pending assignment, late result dropped"
                        );
                    }
                }
            }
            Message::Heartbeat(hb) => {
                tracing::trace!(worker_id = %envelope.worker_id, busy = hb.busy, "heartbeat");
            }
            other => {
                tracing::trace!(
                    worker_id = %envelope.worker_id,
                    frame = other.type_tag(),
                    "unroutable frame ignored"
                );
            }
        }
    }

    /// Partition the similarity computation for `target_user` across the
    /// currently idle workers and return how many blocks were dispatched.
    ///
    /// With no idle workers the call is a no-op returning 0. Each
    /// dispatched block eventually yields at most one [`BlockResult`] on
    /// `results_tx`, in arrival order; blocks whose worker stays silent
    /// past the result timeout yield nothing.
    pub async fn run(
        &self,
        target_user: UserId,
        ratings: &UserRatings,
        results_tx: mpsc::Sender<BlockResult>,
    ) -> usize {
        let idle = self.registry.snapshot_idle();
        if idle.is_empty() {
            tracing::debug!(target_user, "no idle workers, dispatch skipped");
            return 0;
        }

        let mut candidates: Vec<UserId> = ratings
            .keys()
            .copied()
            .filter(|id| *id != target_user)
            .collect();
        candidates.sort_unstable();
        if candidates.is_empty() {
            tracing::debug!(target_user, "no candidates, dispatch skipped");
            return 0;
        }

        // An unknown target still dispatches; every similarity against an
        // empty vector comes out zero.
        let target_ratings = ratings.get(&target_user).cloned().unwrap_or_default();

        let blocks = partition(candidates.len(), idle.len());
        tracing::info!(
            target_user,
            candidates = candidates.len(),
            blocks = blocks.len(),
            idle = idle.len(),
            "dispatching"
        );

        let mut dispatched = 0;
        for (worker_id, block) in idle.iter().zip(&blocks) {
            let candidate_ratings = candidates[block.start_id..=block.end_id]
                .iter()
                .filter_map(|id| ratings.get(id).map(|r| (*id, r.clone())))
                .collect();
            let task = Task {
                job_id: worker_id.clone(),
                block_id: *block,
                k: self.k,
                target_ratings: target_ratings.clone(),
                candidate_ratings,
            };

            let (slot_tx, slot_rx) = oneshot::channel();
            self.pending.lock().await.insert(worker_id.clone(), slot_tx);

            let Some(sender) = self.registry.sender(worker_id) else {
                // Disconnected between snapshot and send.
                self.pending.lock().await.remove(worker_id);
                continue;
            };
            if let Err(e) = sender.try_send(Message::Task(task)) {
                tracing::warn!(
                    worker_id = %worker_id,
                    error = %e,
                    "send queue unavailable, assignment dropped"
                );
                self.pending.lock().await.remove(worker_id);
                continue;
            }

            self.registry.set_state(worker_id, WorkerState::Busy);
            dispatched += 1;

            tokio::spawn(assignment_waiter(
                worker_id.clone(),
                slot_rx,
                results_tx.clone(),
                self.registry.clone(),
                self.pending.clone(),
                self.result_timeout,
                self.shutdown.subscribe(),
            ));
        }

        dispatched
    }
}

/// Wait for one assignment to resolve.
///
/// Either the routed RESULT arrives (forwarded to the caller) or the
/// deadline expires (the pending slot is removed so a late result has
/// nowhere to land). Both paths hand the worker back to the idle pool.
async fn assignment_waiter(
    worker_id: String,
    slot_rx: oneshot::Receiver<BlockResult>,
    results_tx: mpsc::Sender<BlockResult>,
    registry: Arc<WorkerRegistry>,
    pending: PendingResults,
    timeout: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::select! {
        outcome = slot_rx => {
            if let Ok(result) = outcome {
                let _ = results_tx.send(result).await;
            }
            registry.set_state(&worker_id, WorkerState::Idle);
        }
        _ = tokio::time::sleep(timeout) => {
            tracing::warn!(worker_id = %worker_id, ?timeout, "assignment timed out");
            pending.lock().await.remove(&worker_id);
            registry.set_state(&worker_id, WorkerState::Idle);
        }
        _ = shutdown.recv() => {
            pending.lock().await.remove(&worker_id);
        }
    }
}

/// Split `candidates` indices into `min(workers, candidates)` contiguous
/// blocks. The first `candidates % blocks` blocks take one extra item, so
/// sizes differ by at most one and the union covers `0..candidates`.
fn partition(candidates: usize, workers: usize) -> Vec<Block> {
    let blocks = workers.min(candidates);
    if blocks == 0 {
        return Vec::new();
    }

    let base = candidates / blocks;
    let remainder = candidates % blocks;

    let mut out = Vec::with_capacity(blocks);
    let mut start = 0;
    for i in 0..blocks {
        let len = base + usize::from(i < remainder);
        out.push(Block {
            start_id: start,
            end_id: start + len - 1,
        });
        start += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(blocks: &[Block]) -> Vec<usize> {
        blocks.iter().map(Block::len).collect()
    }

    fn assert_covers(blocks: &[Block], candidates: usize) {
        let mut expected_start = 0;
        for block in blocks {
            assert_eq!(block.start_id, expected_start, "blocks must be adjacent");
            assert!(block.end_id >= block.start_id);
            expected_start = block.end_id + 1;
        }
        assert_eq!(expected_start, candidates, "blocks must cover all candidates");
    }

    #[test]
    fn ten_candidates_three_workers() {
        let blocks = partition(10, 3);
        assert_eq!(sizes(&blocks), vec![4, 3, 3]);
        assert_covers(&blocks, 10);
        assert_eq!(blocks[0], Block { start_id: 0, end_id: 3 });
        assert_eq!(blocks[2], Block { start_id: 7, end_id: 9 });
    }

    #[test]
    fn even_split() {
        let blocks = partition(12, 4);
        assert_eq!(sizes(&blocks), vec![3, 3, 3, 3]);
        assert_covers(&blocks, 12);
    }

    #[test]
    fn single_worker_takes_everything() {
        let blocks = partition(7, 1);
        assert_eq!(sizes(&blocks), vec![7]);
        assert_covers(&blocks, 7);
    }

    #[test]
    fn more_workers_than_candidates_caps_block_count() {
        let blocks = partition(2, 5);
        assert_eq!(blocks.len(), 2);
        assert_eq!(sizes(&blocks), vec![1, 1]);
        assert_covers(&blocks, 2);
    }

    #[test]
    fn no_candidates_means_no_blocks() {
        assert!(partition(0, 3).is_empty());
    }

    #[test]
    fn no_workers_means_no_blocks() {
        assert!(partition(10, 0).is_empty());
    }

    #[test]
    fn block_sizes_differ_by_at_most_one() {
        for candidates in 1..=40 {
            for workers in 1..=12 {
                let blocks = partition(candidates, workers);
                assert_eq!(blocks.len(), workers.min(candidates));
                assert_covers(&blocks, candidates);
                let sizes = sizes(&blocks);
                let max = sizes.iter().max().unwrap();
                let min = sizes.iter().min().unwrap();
                assert!(max - min <= 1, "candidates={candidates} workers={workers}");
            }
        }
    }
}
