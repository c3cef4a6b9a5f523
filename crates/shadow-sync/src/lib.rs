//! shadow-sync - Cloud synchronization engine
//!
//! Provides:
//! - Per-shadow FIFO request queues with merge-on-enqueue coalescing
//! - A bounded worker pool draining those queues, one worker per key
//! - Exponential-backoff retry classified by the cloud error taxonomy
//! - Full-shadow reconciliation (three-way merge) for conflict resolution
//! - Realtime and periodic dispatch strategies, switchable live
//! - Direction gating (device↔cloud, device→cloud, cloud→device)

mod handler;
mod merge;
mod pool;
mod queue;
mod registry;
mod retry;
mod strategy;

pub use handler::{enqueue, Outcome, SyncHandler};
pub use merge::reconcile;
pub use pool::WorkerPool;
pub use queue::SyncQueues;
pub use registry::LockRegistry;
pub use retry::with_retry;
pub use strategy::SyncStrategy;
