//! Publisher port (driven/secondary port)
//!
//! This module defines the single publish interface used for all local
//! pub-sub fan-out (§4.9). The source system historically exposed two
//! equivalent paths for this (an older accept/reject pair and a newer
//! generic publish call); this consolidates them into one trait, per
//! the design note accompanying that observation.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because publish failures are transport
//!   specific (MQTT broker unavailable, serialization failure); per
//!   §4.9 these are logged and swallowed by the caller, never
//!   propagated to the operation's own result.

use serde_json::Value;

use crate::domain::newtypes::ShadowKey;

/// Which of the four topic suffixes a publish targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishTopic {
    /// `.../<op>/accepted`
    Accepted,
    /// `.../<op>/rejected`
    Rejected,
    /// `.../update/delta`
    Delta,
    /// `.../<op>/documents`
    Documents,
}

/// The local operation a publish corresponds to, used to build the
/// topic's `<op>` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowOperation {
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `get`
    Get,
}

impl ShadowOperation {
    /// The topic segment for this operation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Get => "get",
        }
    }
}

/// Port trait for publishing shadow lifecycle events to local pub-sub.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `body` on the topic identified by `key`, `operation`,
    /// and `topic`.
    ///
    /// # Errors
    /// Adapter-specific; callers are expected to log and swallow
    /// failures rather than fail the triggering operation.
    async fn publish(
        &self,
        key: &ShadowKey,
        operation: ShadowOperation,
        topic: PublishTopic,
        body: &Value,
    ) -> anyhow::Result<()>;
}

/// Builds the MQTT-style topic string for a publish, matching
/// `$aws/things/<thing>/shadow[/name/<shadow>]/<op>/<suffix>`.
#[must_use]
pub fn topic_string(key: &ShadowKey, operation: ShadowOperation, topic: PublishTopic) -> String {
    let suffix = match topic {
        PublishTopic::Accepted => "accepted",
        PublishTopic::Rejected => "rejected",
        PublishTopic::Delta => "delta",
        PublishTopic::Documents => "documents",
    };
    match &key.shadow {
        Some(name) => format!(
            "$aws/things/{}/shadow/name/{}/{}/{}",
            key.thing,
            name,
            operation.as_str(),
            suffix
        ),
        None => format!("$aws/things/{}/shadow/{}/{}", key.thing, operation.as_str(), suffix),
    }
}
