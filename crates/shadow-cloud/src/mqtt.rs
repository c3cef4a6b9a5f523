//! MQTT cloud data client
//!
//! Maintains the set of subscribed topics derived from the configured
//! sync set and translates inbound `.../accepted` notifications into
//! `LocalUpdate`/`LocalDelete` sync requests. Also the production
//! [`Publisher`] adapter used for the local pub-sub fan-out (§4.9),
//! since the same `AsyncClient` handle both subscribes for inbound
//! notifications and publishes outbound ones.
//!
//! `rumqttc` is the idiomatic ecosystem crate for an MQTT client;
//! its `AsyncClient`/`EventLoop` pair runs the event loop as its own
//! task pumping `Event::Incoming` packets into the dispatch logic below.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde_json::Value;
use shadow_core::domain::{document, PatchState, ShadowKey, SyncRequest};
use shadow_core::ports::{topic_string, Publisher, PublishTopic, ShadowOperation};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::topic::{parse_inbound, subscription_topics, InboundKind};

const SUBSCRIBE_RETRY_INITIAL: Duration = Duration::from_secs(1);
const SUBSCRIBE_RETRY_MAX: Duration = Duration::from_secs(60);

/// Owns the MQTT connection and exposes subscription reconciliation,
/// inbound dispatch, and outbound publish.
pub struct CloudDataClient {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    stop_subscribing: Arc<AtomicBool>,
}

impl CloudDataClient {
    /// Connects to `host:port` as `client_id` and returns the client
    /// plus its event loop. The caller is expected to spawn
    /// [`Self::run_event_loop`] and keep the returned handle alive.
    #[must_use]
    pub fn connect(client_id: &str, host: &str, port: u16) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, event_loop) = AsyncClient::new(options, 256);

        (
            Self {
                client,
                connected: Arc::new(AtomicBool::new(false)),
                stop_subscribing: Arc::new(AtomicBool::new(false)),
            },
            event_loop,
        )
    }

    /// True once the underlying connection has observed at least one
    /// `ConnAck`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// The connection flag this client's `is_connected`/
    /// `update_subscriptions` read. Pass this to [`Self::run_event_loop`]
    /// so the event-loop task and the client handle observe the same
    /// state.
    #[must_use]
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    /// Stops any in-progress subscription retry loop.
    pub fn stop_subscribing(&self) {
        self.stop_subscribing.store(true, Ordering::Relaxed);
    }

    /// Reconciles the subscribed topic set against `desired` (one entry
    /// per tracked shadow key), issuing subscribes/unsubscribes for the
    /// difference. A no-op while disconnected.
    pub async fn update_subscriptions(&self, current: &HashSet<String>, desired: &HashSet<ShadowKey>) -> HashSet<String> {
        if !self.is_connected() {
            return current.clone();
        }

        let desired_topics: HashSet<String> = desired.iter().flat_map(subscription_topics).collect();

        let to_subscribe: Vec<&String> = desired_topics.difference(current).collect();
        let to_unsubscribe: Vec<&String> = current.difference(&desired_topics).collect();

        for topic in to_subscribe {
            self.subscribe_with_retry(topic).await;
        }
        for topic in to_unsubscribe {
            if let Err(err) = self.client.unsubscribe(topic).await {
                warn!(topic, error = %err, "failed to unsubscribe");
            }
        }

        desired_topics
    }

    async fn subscribe_with_retry(&self, topic: &str) {
        let mut delay = SUBSCRIBE_RETRY_INITIAL;
        loop {
            if self.stop_subscribing.load(Ordering::Relaxed) {
                return;
            }
            match self.client.subscribe(topic, QoS::AtLeastOnce).await {
                Ok(()) => return,
                Err(err) => {
                    warn!(topic, delay_ms = delay.as_millis() as u64, error = %err, "subscribe failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(SUBSCRIBE_RETRY_MAX);
                }
            }
        }
    }

    /// Pumps `event_loop` until it errors, marking `connected`/
    /// disconnected and forwarding parsed inbound sync requests to
    /// `dispatch_tx`. Intended to run as its own `tokio` task.
    pub async fn run_event_loop(event_loop: &mut EventLoop, connected: Arc<AtomicBool>, dispatch_tx: mpsc::Sender<(ShadowKey, SyncRequest)>) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected.store(true, Ordering::Relaxed);
                    debug!("mqtt connected");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Some(request) = decode_inbound(&publish.topic, &publish.payload) {
                        let (key, sync_request) = request;
                        if dispatch_tx.send((key, sync_request)).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!(error = %err, "mqtt event loop error, reconnecting");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

fn decode_inbound(topic: &str, payload: &[u8]) -> Option<(ShadowKey, SyncRequest)> {
    let (key, kind) = parse_inbound(topic)?;
    let body: Value = serde_json::from_slice(payload).ok()?;
    let version = body.get("version")?.as_u64()?;

    match kind {
        InboundKind::UpdateAccepted => {
            let state = body.get("state").cloned().unwrap_or_default();
            let patch = PatchState {
                desired: state.get("desired").cloned(),
                reported: state.get("reported").cloned(),
            };
            Some((key, SyncRequest::LocalUpdate { version, patch }))
        }
        InboundKind::DeleteAccepted => Some((key, SyncRequest::LocalDelete { version })),
    }
}

#[async_trait::async_trait]
impl Publisher for CloudDataClient {
    async fn publish(&self, key: &ShadowKey, operation: ShadowOperation, topic: PublishTopic, body: &Value) -> anyhow::Result<()> {
        let topic_str = topic_string(key, operation, topic);
        let payload = serde_json::to_vec(body)?;
        self.client.publish(topic_str, QoS::AtLeastOnce, false, payload).await?;
        Ok(())
    }
}
