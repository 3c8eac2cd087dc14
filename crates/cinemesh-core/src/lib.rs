//! cinemesh-core — wire protocol, configuration, and dataset loading.
//! Both the coordinator and the worker crates depend on this one.

pub mod config;
pub mod message;
pub mod ratings;
pub mod wire;

pub use message::{Block, BlockResult, Message, Neighbor, Task};
pub use ratings::UserRatings;
