//! Bounded worker pool draining the per-shadow sync queues
//!
//! Built on the same `tokio::select!`-between-channel-and-timer idiom as
//! the workspace's change-debounce scheduler: realtime dispatch loops
//! continuously with a short idle sleep between scans; periodic
//! dispatch wakes on a `tokio::time::interval` tick and drains every
//! ready queue in one pass. A `watch::Receiver<SyncStrategy>` lets the
//! strategy change live without restarting the pool or losing queued
//! requests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shadow_core::domain::ShadowKey;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handler::{Outcome, SyncHandler};
use crate::queue::SyncQueues;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drains [`SyncQueues`] through a [`SyncHandler`], bounded to at most
/// `concurrency` in-flight keys at a time.
pub struct WorkerPool {
    queues: Arc<SyncQueues>,
    handler: Arc<SyncHandler>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<ShadowKey>>>,
    strategy: watch::Receiver<crate::strategy::SyncStrategy>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Creates a pool over `queues`/`handler`, bounded to `concurrency`
    /// concurrently in-flight keys, starting under `strategy`.
    #[must_use]
    pub fn new(
        queues: Arc<SyncQueues>,
        handler: Arc<SyncHandler>,
        concurrency: usize,
        strategy: watch::Receiver<crate::strategy::SyncStrategy>,
    ) -> Self {
        Self {
            queues,
            handler,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            strategy,
            workers: JoinSet::new(),
        }
    }

    /// Runs the dispatch loop until `cancellation` fires, then waits for
    /// every in-flight drain task to finish its current request before
    /// returning, per the "terminates workers after their current
    /// request returns" shutdown contract.
    pub async fn run(&mut self, cancellation: CancellationToken) {
        info!("sync worker pool started");
        loop {
            let strategy = *self.strategy.borrow();
            match strategy {
                crate::strategy::SyncStrategy::Realtime => {
                    self.dispatch_ready(&cancellation);
                    tokio::select! {
                        () = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                        result = self.strategy.changed() => { if result.is_err() { break; } }
                        () = cancellation.cancelled() => break,
                    }
                }
                crate::strategy::SyncStrategy::Periodic(delay) => {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => { self.dispatch_ready(&cancellation); }
                        result = self.strategy.changed() => { if result.is_err() { break; } }
                        () = cancellation.cancelled() => break,
                    }
                }
            }
        }
        info!(in_flight = self.workers.len(), "sync worker pool draining in-flight workers");
        while self.workers.join_next().await.is_some() {}
        info!("sync worker pool stopped");
    }

    /// Spawns a drain task for every ready key not already in flight.
    fn dispatch_ready(&mut self, cancellation: &CancellationToken) {
        for key in self.queues.ready_keys() {
            let claimed = {
                let mut in_flight = self.in_flight.lock().expect("in_flight mutex poisoned");
                in_flight.insert(key.clone())
            };
            if !claimed {
                continue;
            }

            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                let mut in_flight = self.in_flight.lock().expect("in_flight mutex poisoned");
                in_flight.remove(&key);
                continue;
            };

            let queues = self.queues.clone();
            let handler = self.handler.clone();
            let in_flight = self.in_flight.clone();
            let cancellation = cancellation.clone();

            self.workers.spawn(async move {
                let _permit = permit;
                drain_key(&queues, &handler, &key, &cancellation).await;
                in_flight.lock().expect("in_flight mutex poisoned").remove(&key);
            });
        }
    }
}

/// Pops and executes requests for `key` until the queue empties or
/// `cancellation` fires; a request already in flight is always allowed
/// to return before the loop re-checks cancellation, so a shutdown
/// never abandons a call mid-execution.
async fn drain_key(queues: &SyncQueues, handler: &SyncHandler, key: &ShadowKey, cancellation: &CancellationToken) {
    while let Some(request) = queues.pop(key) {
        debug!(key = %key, kind = request.kind(), "executing sync request");
        match handler.execute(key, &request).await {
            Outcome::Done => {}
            Outcome::Requeue(next) => {
                queues.offer(key, next);
            }
        }
        if cancellation.is_cancelled() {
            break;
        }
    }
}
