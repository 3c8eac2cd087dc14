//! Typed messages exchanged between the coordinator and its workers.
//!
//! These types ARE the protocol. Every frame on the wire is one `Message`,
//! serialized as a JSON object `{"type": "<TAG>", "data": {...}}`. Field
//! names and type tags are part of the wire format; changing anything here
//! is a breaking change for every deployed worker.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// MovieLens-style user identifier.
pub type UserId = u32;

/// MovieLens-style movie identifier.
pub type MovieId = u32;

/// One user's ratings: movieID → rating.
///
/// Ratings are finite doubles; MovieLens uses [0, 5] but the protocol
/// accepts any finite value. Serialized with string keys, as JSON requires.
pub type RatingVector = HashMap<MovieId, f64>;

/// The tagged union carried by every frame.
///
/// Discriminated by the `type` field; the `data` field holds the payload
/// for that tag. An unknown tag fails deserialization, which the codec
/// surfaces as a protocol error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "UPPERCASE")]
pub enum Message {
    /// First frame on every connection, worker → coordinator.
    Hello(Hello),
    /// Handshake reply carrying the server-assigned worker ID.
    Ack(Ack),
    /// One block of similarity work, coordinator → worker.
    Task(Task),
    /// Ranked neighbors for one completed block, worker → coordinator.
    Result(BlockResult),
    /// Periodic liveness frame, worker → coordinator.
    Heartbeat(Heartbeat),
    /// Reserved for fault reporting in either direction.
    Error(Fault),
}

impl Message {
    /// The wire tag, for logging.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Message::Hello(_) => "HELLO",
            Message::Ack(_) => "ACK",
            Message::Task(_) => "TASK",
            Message::Result(_) => "RESULT",
            Message::Heartbeat(_) => "HEARTBEAT",
            Message::Error(_) => "ERROR",
        }
    }
}

/// Sent by a worker immediately after connecting. `worker_id` is empty —
/// the coordinator assigns one in the ACK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub worker_id: String,
    /// Task slots the worker advertises (its CPU count).
    pub concurrency: usize,
}

/// Handshake acknowledgment. `worker_id` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub worker_id: String,
}

/// The contiguous range of indices into the sorted candidate list that a
/// task covers. Both ends inclusive. Used for correlation and debugging —
/// the candidate data itself travels in the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub start_id: usize,
    pub end_id: usize,
}

impl Block {
    /// Number of candidates in the block. Never zero: `end_id >= start_id`.
    pub fn len(&self) -> usize {
        self.end_id - self.start_id + 1
    }
}

/// The unit of work sent to one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Correlates the RESULT back to its assignment. Equal to the assigned
    /// worker's ID — one outstanding task per worker.
    pub job_id: String,
    pub block_id: Block,
    /// Neighbor count to return.
    pub k: usize,
    /// The target user's rating vector.
    pub target_ratings: RatingVector,
    /// Rating vectors for every candidate in the block, keyed by user ID.
    pub candidate_ratings: HashMap<UserId, RatingVector>,
}

/// A candidate user annotated with its similarity to the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Candidate user ID, stringified.
    pub id: String,
    /// Cosine similarity in [-1, 1].
    pub similarity: f64,
}

/// A worker's answer for one block: neighbors sorted strictly descending
/// by similarity, at most `k` of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockResult {
    pub job_id: String,
    pub block_id: Block,
    pub neighbors: Vec<Neighbor>,
}

/// Periodic liveness report. Refreshes the coordinator's last-seen stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: String,
    pub busy: bool,
    /// CPU load, reserved. Workers currently send 0.
    pub cpu: f64,
}

/// Reserved fault payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub message: String,
}
