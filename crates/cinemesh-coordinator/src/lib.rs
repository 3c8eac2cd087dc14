//! cinemesh-coordinator — the dispatch plane.
//!
//! Workers connect over TCP ([`server`]), get tracked in the [`registry`],
//! and receive partitioned similarity jobs from the [`dispatcher`]. The
//! [`recommend`] adapter is the single entry point the query plane uses.

pub mod dispatcher;
pub mod recommend;
pub mod registry;
pub mod server;

pub use dispatcher::Dispatcher;
pub use recommend::Recommender;
pub use registry::{WorkerRegistry, WorkerState};
pub use server::TcpServer;
