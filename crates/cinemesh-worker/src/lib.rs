//! cinemesh-worker — worker-node client and similarity engine.

pub mod client;
pub mod engine;

pub use client::{ClientError, WorkerClient};
