//! Reactive configuration: poll-and-diff watcher plus reconciliation task
//!
//! Mirrors the subscription reconciler's shape (`tokio::select!` between a
//! sleep and cancellation, no external file-notification dependency): the
//! watcher reloads the configuration file on an interval, diffs it against
//! the last-applied [`Config`], and posts one [`ConfigEvent`] per changed
//! section to the reconciliation task. The reconciliation task is the only
//! thing that ever calls into the live collaborators; the watcher itself
//! never mutates anything, matching the "never applied by direct mutation
//! from a watcher callback" rule.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shadow_core::config::{Config, ConfigEvent};
use shadow_core::domain::{Direction, ShadowKey};
use shadow_ipc::InboundRateLimiter;
use shadow_sync::{SyncQueues, SyncStrategy};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polls `path` for configuration changes every [`CONFIG_POLL_INTERVAL`],
/// starting from `applied` (the configuration already wired up at
/// startup). A reload that fails to parse is logged and skipped, leaving
/// the last-known-good configuration as the diff baseline until the file
/// is fixed.
pub async fn run_config_watch(path: PathBuf, mut applied: Config, tx: mpsc::Sender<ConfigEvent>, cancellation: CancellationToken) {
    loop {
        tokio::select! {
            () = tokio::time::sleep(CONFIG_POLL_INTERVAL) => {}
            () = cancellation.cancelled() => return,
        }

        let next = match Config::load(&path) {
            Ok(next) => next,
            Err(err) => {
                warn!(%err, path = %path.display(), "skipping unreadable configuration reload");
                continue;
            }
        };

        for event in applied.diff(&next) {
            info!(?event, "configuration change detected");
            if tx.send(event).await.is_err() {
                return;
            }
        }
        applied = next;
    }
}

/// Applies posted [`ConfigEvent`]s to the live collaborators: the sole
/// writer of runtime state derived from configuration. Each event kind
/// maps onto exactly one collaborator, so a malformed or partial
/// configuration never leaves two of them disagreeing about what is
/// current.
pub async fn run_config_reconciler(
    mut rx: mpsc::Receiver<ConfigEvent>,
    rate_limiter: Arc<InboundRateLimiter>,
    strategy_tx: watch::Sender<SyncStrategy>,
    queues: Arc<SyncQueues>,
    desired_tx: watch::Sender<HashSet<ShadowKey>>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            ConfigEvent::Strategy(strategy) => {
                let _ = strategy_tx.send(SyncStrategy::parse(&strategy.kind, strategy.delay));
            }
            ConfigEvent::RateLimits(limits) => {
                rate_limiter.set_rates(limits.max_local_request_rate_per_thing, limits.max_total_local_request_rate);
            }
            ConfigEvent::Direction(direction) => {
                queues.set_direction(Direction::parse(&direction));
            }
            ConfigEvent::ShadowDocuments(scopes) => {
                let _ = desired_tx.send(crate::desired_keys(&scopes));
            }
        }
    }
}
