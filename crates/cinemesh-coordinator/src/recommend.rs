//! Front-end adapter — the single capability the query plane consumes:
//! trigger a dispatch for a target user and await its ordered results.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};

use cinemesh_core::message::{BlockResult, Neighbor, UserId};
use cinemesh_core::ratings::UserRatings;

use crate::dispatcher::Dispatcher;

/// Buffer for one dispatch call's results.
pub const RESULT_BUFFER: usize = 100;

/// What one dispatch call produced. `results.len() < dispatched` means
/// some blocks timed out or were cancelled.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub dispatched: usize,
    pub results: Vec<BlockResult>,
}

pub struct Recommender {
    dispatcher: Arc<Dispatcher>,
    /// Loaded once at startup, read-only afterwards. The lock exists so a
    /// future hot-reload can swap the dataset under live queries.
    ratings: Arc<RwLock<UserRatings>>,
    shutdown: broadcast::Sender<()>,
}

impl Recommender {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        ratings: Arc<RwLock<UserRatings>>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            dispatcher,
            ratings,
            shutdown,
        }
    }

    /// Dispatch a similarity job for `user_id` and collect its block
    /// results, sorted by block position.
    ///
    /// Drains exactly as many results as were dispatched; a timed-out
    /// block drops its sender, so a shortfall ends the drain early rather
    /// than hanging. Returns whatever arrived — possibly nothing.
    pub async fn trigger_dispatch(&self, user_id: UserId) -> DispatchOutcome {
        let (results_tx, mut results_rx) = mpsc::channel(RESULT_BUFFER);

        let dispatched = {
            let ratings = self.ratings.read().await;
            self.dispatcher.run(user_id, &ratings, results_tx).await
        };

        let mut results = Vec::with_capacity(dispatched);
        let mut shutdown = self.shutdown.subscribe();
        for _ in 0..dispatched {
            tokio::select! {
                received = results_rx.recv() => match received {
                    Some(result) => results.push(result),
                    // All waiters are gone; the remaining blocks timed out.
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }

        results.sort_unstable_by_key(|r| r.block_id.start_id);
        DispatchOutcome {
            dispatched,
            results,
        }
    }
}

/// Merge per-block neighbor lists into one ranking, best-first, capped at
/// `k`. Block results are already sorted, but similarities interleave
/// across blocks, so this re-sorts the union.
pub fn merge_neighbors(results: &[BlockResult], k: usize) -> Vec<Neighbor> {
    let mut merged: Vec<Neighbor> = results
        .iter()
        .flat_map(|r| r.neighbors.iter().cloned())
        .collect();
    merged.sort_unstable_by(|a, b| b.similarity.total_cmp(&a.similarity));
    merged.truncate(k);
    merged
}
