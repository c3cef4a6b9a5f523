//! MQTT topic construction and parsing
//!
//! Mirrors the wire pattern used by [`shadow_core::ports::publisher`]:
//! `$aws/things/<thing>/shadow[/name/<shadow>]/<update|delete>/accepted`.
//! The cloud data client only ever subscribes to the two `accepted`
//! suffixes per shadow; everything else is published, not consumed.

use shadow_core::domain::{ShadowKey, ShadowName, ThingName};

/// The two subscription topics maintained for one shadow.
#[must_use]
pub fn subscription_topics(key: &ShadowKey) -> [String; 2] {
    [shadow_topic(key, "update", "accepted"), shadow_topic(key, "delete", "accepted")]
}

fn shadow_topic(key: &ShadowKey, op: &str, suffix: &str) -> String {
    match &key.shadow {
        Some(name) => format!("$aws/things/{}/shadow/name/{}/{}/{}", key.thing, name, op, suffix),
        None => format!("$aws/things/{}/shadow/{}/{}", key.thing, op, suffix),
    }
}

/// What an inbound topic corresponds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    /// `.../update/accepted`
    UpdateAccepted,
    /// `.../delete/accepted`
    DeleteAccepted,
}

/// Parses an inbound topic into the shadow key it addresses and which
/// of the two subscribed suffixes matched. Returns `None` for anything
/// else (unknown or malformed topics are logged and dropped by the
/// caller).
#[must_use]
pub fn parse_inbound(topic: &str) -> Option<(ShadowKey, InboundKind)> {
    let rest = topic.strip_prefix("$aws/things/")?;
    let (thing_str, rest) = rest.split_once("/shadow")?;
    let thing = ThingName::new(thing_str).ok()?;

    let (shadow, rest) = if let Some(named) = rest.strip_prefix("/name/") {
        let (name_str, rest) = named.split_once('/')?;
        (ShadowName::new(name_str).ok(), rest)
    } else {
        (None, rest.strip_prefix('/')?)
    };

    let kind = match rest {
        "update/accepted" => InboundKind::UpdateAccepted,
        "delete/accepted" => InboundKind::DeleteAccepted,
        _ => return None,
    };

    Some((ShadowKey::new(thing, shadow), kind))
}
