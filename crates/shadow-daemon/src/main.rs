//! shadow-managerd — device shadow manager background daemon
//!
//! Wires the hexagonal core to its adapters: the SQLite local store, the
//! MQTT/HTTP cloud data client, the local request-handler surface, and
//! the sync worker pool. A config watcher polls for configuration
//! changes and feeds them to a reconciliation task (`config_watch`)
//! that is the sole mutator of the strategy, rate limits, direction,
//! and subscription set while the daemon runs. Runs until
//! `SIGINT`/`SIGTERM`, draining in-flight sync work before exit.

mod config_watch;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shadow_core::config::{Config, ShadowDocumentScope};
use shadow_core::domain::{Direction, ShadowKey, ShadowName, ThingName};
use shadow_core::ports::Authorizer;
use shadow_cloud::http::HttpCloudDataPlane;
use shadow_cloud::mqtt::CloudDataClient;
use shadow_ipc::{InboundRateLimiter, ShadowRequestHandlers};
use shadow_store::{DatabasePool, SqliteLocalStore};
use shadow_sync::{LockRegistry, SyncHandler, SyncQueues, SyncStrategy, WorkerPool};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SYNC_QUEUE_CAPACITY: usize = 1024;
const SUBSCRIPTION_RECONCILE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
const CONFIG_EVENT_CAPACITY: usize = 16;

/// Authorization is an external policy decision out of scope for this
/// daemon; every caller is accepted until a real adapter is configured.
struct AllowAllAuthorizer;

#[async_trait::async_trait]
impl Authorizer for AllowAllAuthorizer {
    async fn authorize(&self, _caller: &str, _key: &ShadowKey) -> Result<(), ()> {
        Ok(())
    }
}

fn init_tracing(logging: &shadow_core::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}

/// Parses the configured sync scope into the set of shadow keys the
/// cloud client should be subscribed against, dropping any entry whose
/// thing or shadow name fails validation rather than refusing to start.
pub(crate) fn desired_keys(scopes: &[ShadowDocumentScope]) -> HashSet<ShadowKey> {
    let mut keys = HashSet::new();
    for scope in scopes {
        let thing = match ThingName::new(scope.thing_name.clone()) {
            Ok(thing) => thing,
            Err(err) => {
                warn!(thing = %scope.thing_name, error = %err, "skipping invalid thing in synchronize.shadowDocuments");
                continue;
            }
        };
        if scope.classic {
            keys.insert(ShadowKey::classic(thing.clone()));
        }
        for name in &scope.named_shadows {
            match ShadowName::new(name.clone()) {
                Ok(shadow) => {
                    keys.insert(ShadowKey::new(thing.clone(), Some(shadow)));
                }
                Err(err) => {
                    warn!(thing = %scope.thing_name, shadow = %name, error = %err, "skipping invalid named shadow in synchronize.shadowDocuments");
                }
            }
        }
    }
    keys
}

async fn run_subscription_reconciler(
    cloud_client: Arc<CloudDataClient>,
    mut desired: watch::Receiver<HashSet<ShadowKey>>,
    cancellation: CancellationToken,
) {
    let mut current = HashSet::new();
    loop {
        let wanted = desired.borrow_and_update().clone();
        current = cloud_client.update_subscriptions(&current, &wanted).await;
        tokio::select! {
            () = tokio::time::sleep(SUBSCRIPTION_RECONCILE_INTERVAL) => {}
            result = desired.changed() => { if result.is_err() { return; } }
            () = cancellation.cancelled() => return,
        }
    }
}

async fn run_sync_dispatch(mut rx: mpsc::Receiver<(ShadowKey, shadow_core::domain::SyncRequest)>, queues: Arc<SyncQueues>) {
    while let Some((key, request)) = rx.recv().await {
        shadow_sync::enqueue(&queues, &key, request);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path: PathBuf = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    init_tracing(&config.logging);

    let validation_errors = config.validate();
    if !validation_errors.is_empty() {
        for err in &validation_errors {
            error!(%err, "invalid configuration");
        }
        anyhow::bail!("refusing to start with {} configuration error(s)", validation_errors.len());
    }

    info!(path = %config_path.display(), "loaded configuration");

    let db_pool = DatabasePool::new(Path::new(&config.storage.db_path)).await?;
    let store: Arc<dyn shadow_core::ports::LocalStore> =
        Arc::new(SqliteLocalStore::new(db_pool.pool().clone(), Some(config.max_disk_utilization_mega_bytes)));

    let cloud_http: Arc<dyn shadow_core::ports::CloudDataPlane> =
        Arc::new(HttpCloudDataPlane::new(config.cloud.http_base_url.clone(), config.cloud.auth_token.clone()));

    let (mqtt_client, mut event_loop) = CloudDataClient::connect(&config.cloud.client_id, &config.cloud.mqtt_host, config.cloud.mqtt_port);
    let mqtt_client = Arc::new(mqtt_client);

    let cancellation = CancellationToken::new();
    let connected = mqtt_client.connected_flag();

    let (dispatch_tx, dispatch_rx) = mpsc::channel(SYNC_QUEUE_CAPACITY);
    let (sync_tx, sync_rx) = mpsc::channel(SYNC_QUEUE_CAPACITY);

    let locks = Arc::new(LockRegistry::new());
    let rate_limiter = Arc::new(InboundRateLimiter::new(
        config.rate_limits.max_local_request_rate_per_thing,
        config.rate_limits.max_total_local_request_rate,
    ));

    let handlers = Arc::new(ShadowRequestHandlers::new(
        store.clone(),
        locks,
        rate_limiter.clone(),
        Arc::new(AllowAllAuthorizer),
        mqtt_client.clone() as Arc<dyn shadow_core::ports::Publisher>,
        sync_tx,
        config.shadow_document_size_limit_bytes as usize,
    ));

    let sync_handler = Arc::new(SyncHandler::new(
        store,
        cloud_http,
        handlers.clone() as Arc<dyn shadow_core::ports::LocalMutator>,
        cancellation.clone(),
    ));

    let direction = Direction::parse(&config.synchronize.direction);
    let queues = Arc::new(SyncQueues::new(direction));

    // Retained and handed to the config reconciliation task below, which is
    // the only thing that ever sends on it; the pool's `strategy.changed()`
    // select arm resolves with an error (treated as "stop") if every sender
    // is ever dropped.
    let (strategy_tx, strategy_rx) = watch::channel(SyncStrategy::parse(&config.strategy.kind, config.strategy.delay));
    let mut pool = WorkerPool::new(queues.clone(), sync_handler, config.synchronize.worker_concurrency, strategy_rx);

    let (desired_tx, desired_rx) = watch::channel(desired_keys(&config.synchronize.shadow_documents));
    let (config_event_tx, config_event_rx) = mpsc::channel(CONFIG_EVENT_CAPACITY);

    let mqtt_event_loop_task = {
        let connected = connected.clone();
        tokio::spawn(async move {
            CloudDataClient::run_event_loop(&mut event_loop, connected, dispatch_tx).await;
        })
    };

    let dispatch_to_sync_task = {
        let queues = queues.clone();
        tokio::spawn(async move { run_sync_dispatch(sync_rx, queues).await })
    };

    let dispatch_from_mqtt_task = {
        let queues = queues.clone();
        tokio::spawn(async move { run_sync_dispatch(dispatch_rx, queues).await })
    };

    let reconciler_task = {
        let cloud_client = mqtt_client.clone();
        let cancellation = cancellation.clone();
        tokio::spawn(async move { run_subscription_reconciler(cloud_client, desired_rx, cancellation).await })
    };

    let config_watch_task = {
        let cancellation = cancellation.clone();
        let config = config.clone();
        tokio::spawn(async move { config_watch::run_config_watch(config_path, config, config_event_tx, cancellation).await })
    };

    let config_reconciler_task = {
        let queues = queues.clone();
        tokio::spawn(async move {
            config_watch::run_config_reconciler(config_event_rx, rate_limiter, strategy_tx, queues, desired_tx).await
        })
    };

    let pool_task = {
        let cancellation = cancellation.clone();
        tokio::spawn(async move { pool.run(cancellation).await })
    };

    info!("shadow manager daemon started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining in-flight sync work");
    cancellation.cancel();
    mqtt_client.stop_subscribing();

    let _ = pool_task.await;
    config_watch_task.abort();
    config_reconciler_task.abort();
    reconciler_task.abort();
    dispatch_from_mqtt_task.abort();
    dispatch_to_sync_task.abort();
    mqtt_event_loop_task.abort();

    info!("shadow manager daemon stopped");
    Ok(())
}
