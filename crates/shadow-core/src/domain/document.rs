//! Shadow document model
//!
//! A shadow document is a JSON object with `state.desired`,
//! `state.reported`, a `metadata` tree mirroring `state`'s shape with
//! per-leaf `{"timestamp": <secs>}` records, a monotonically increasing
//! `version`, and a `timestamp`. This module owns parsing, patch
//! validation, structural merge, and delta computation — the one piece
//! of the system with no I/O and no async, so it can be unit tested
//! exhaustively without a store or a clock dependency beyond `now: i64`
//! passed in by the caller.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::errors::ShadowError;
use super::newtypes::ClientToken;

/// Default maximum nesting depth of the `state` subtree.
pub const DEFAULT_MAX_DEPTH: usize = 6;

/// A fully materialized shadow document.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowDocument {
    /// The desired state section, always a JSON object.
    pub desired: Value,
    /// The reported state section, always a JSON object.
    pub reported: Value,
    /// Per-leaf metadata mirroring `desired`'s shape.
    pub desired_metadata: Value,
    /// Per-leaf metadata mirroring `reported`'s shape.
    pub reported_metadata: Value,
    /// Monotonically increasing version, starting at 1.
    pub version: u64,
    /// Seconds since epoch of the last mutation.
    pub timestamp: i64,
}

impl ShadowDocument {
    /// Returns a new, empty document at version 1.
    #[must_use]
    pub fn new_empty(now: i64) -> Self {
        Self {
            desired: Value::Object(Map::new()),
            reported: Value::Object(Map::new()),
            desired_metadata: Value::Object(Map::new()),
            reported_metadata: Value::Object(Map::new()),
            version: 1,
            timestamp: now,
        }
    }
}

/// The `state` section of an inbound update payload: either side may be
/// omitted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PatchState {
    /// Patch to apply to `desired`, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired: Option<Value>,
    /// Patch to apply to `reported`, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported: Option<Value>,
}

/// The wire shape of an `UpdateThingShadow` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePayload {
    /// Expected resulting version; auto-assigned to `current + 1` when absent.
    pub version: Option<u64>,
    /// The patch to merge into the document.
    #[serde(default)]
    pub state: PatchState,
    /// Opaque caller-supplied correlation token.
    #[serde(rename = "clientToken")]
    pub client_token: Option<String>,
}

/// Outcome of a successful `merge` call: the resulting document plus
/// the subset of `state`/`metadata` actually touched, used to build the
/// `documents`/`delta` publish payloads.
pub struct MergeOutcome {
    /// The document after the patch has been applied.
    pub document: ShadowDocument,
    /// The touched leaves of `state` (mirrors `PatchState`'s shape).
    pub touched_state: PatchState,
    /// The touched leaves of `metadata`, same shape as `touched_state`.
    pub touched_metadata: PatchState,
}

/// Parses a full shadow document as persisted by the local store.
///
/// # Errors
/// Returns `ShadowError::InvalidPayload` if `bytes` is not valid JSON or
/// does not match the document schema.
pub fn parse(bytes: &[u8]) -> Result<ShadowDocument, ShadowError> {
    #[derive(Deserialize)]
    struct Wire {
        #[serde(default)]
        state: WireState,
        #[serde(default)]
        metadata: WireState,
        version: u64,
        timestamp: i64,
    }
    #[derive(Deserialize, Default)]
    struct WireState {
        #[serde(default = "empty_object")]
        desired: Value,
        #[serde(default = "empty_object")]
        reported: Value,
    }
    fn empty_object() -> Value {
        Value::Object(Map::new())
    }

    let wire: Wire = serde_json::from_slice(bytes)
        .map_err(|e| ShadowError::InvalidPayload(format!("malformed shadow document: {e}")))?;

    Ok(ShadowDocument {
        desired: wire.state.desired,
        reported: wire.state.reported,
        desired_metadata: wire.metadata.desired,
        reported_metadata: wire.metadata.reported,
        version: wire.version,
        timestamp: wire.timestamp,
    })
}

/// Serializes a document to its wire JSON form.
///
/// When `include_metadata` is false the `metadata` section is omitted
/// entirely, as used for the direct `Get` reply's lighter-weight
/// variants and for cloud payloads that carry metadata separately.
#[must_use]
pub fn to_json(document: &ShadowDocument, include_metadata: bool) -> Vec<u8> {
    let mut state = Map::new();
    state.insert("desired".into(), document.desired.clone());
    state.insert("reported".into(), document.reported.clone());
    if let Some((delta_state, _)) = delta(document) {
        state.insert("delta".into(), delta_state);
    }

    let mut root = Map::new();
    root.insert("state".into(), Value::Object(state));
    if include_metadata {
        let mut metadata = Map::new();
        metadata.insert("desired".into(), document.desired_metadata.clone());
        metadata.insert("reported".into(), document.reported_metadata.clone());
        root.insert("metadata".into(), Value::Object(metadata));
    }
    root.insert("version".into(), json!(document.version));
    root.insert("timestamp".into(), json!(document.timestamp));

    serde_json::to_vec(&Value::Object(root)).unwrap_or_default()
}

/// Validates the patch's `version` field against the current version
/// and resolves the version the write will be assigned.
///
/// Returns `current.version + 1` (or `1` for a brand-new shadow) when
/// the patch omits `version`; otherwise requires an exact match.
///
/// # Errors
/// Returns `ShadowError::VersionConflict` if `version` is present and
/// does not equal `current + 1`.
pub fn validate_patch_version(
    current: Option<&ShadowDocument>,
    patch_version: Option<u64>,
) -> Result<u64, ShadowError> {
    let expected = current.map_or(1, |d| d.version + 1);
    match patch_version {
        None => Ok(expected),
        Some(v) if v == expected => Ok(v),
        Some(v) => Err(ShadowError::VersionConflict { expected, actual: v }),
    }
}

/// Merges `patch` into `current`, returning the new document and the
/// subset of state/metadata actually touched.
///
/// For each key present in the patch: a JSON `null` value deletes the
/// leaf (cascading cleanup of any parent object left empty); an object
/// value recurses when the current value is also an object (or is
/// absent); any other value replaces the leaf outright. Every leaf
/// actually mutated receives a fresh `{"timestamp": now}` metadata
/// record.
///
/// # Errors
/// Returns `ShadowError::InvalidPayload` if the patch nests deeper than
/// `max_depth`.
pub fn merge(
    current: &ShadowDocument,
    patch: &PatchState,
    version: u64,
    now: i64,
    max_depth: usize,
) -> Result<MergeOutcome, ShadowError> {
    let mut desired = as_object(&current.desired);
    let mut desired_meta = as_object(&current.desired_metadata);
    let mut reported = as_object(&current.reported);
    let mut reported_meta = as_object(&current.reported_metadata);

    let mut touched_desired = Map::new();
    let mut touched_desired_meta = Map::new();
    let mut touched_reported = Map::new();
    let mut touched_reported_meta = Map::new();

    if let Some(Value::Object(patch_desired)) = &patch.desired {
        merge_object(
            &mut desired,
            patch_desired,
            &mut desired_meta,
            now,
            &mut touched_desired,
            &mut touched_desired_meta,
            0,
            max_depth,
        )?;
    }
    if let Some(Value::Object(patch_reported)) = &patch.reported {
        merge_object(
            &mut reported,
            patch_reported,
            &mut reported_meta,
            now,
            &mut touched_reported,
            &mut touched_reported_meta,
            0,
            max_depth,
        )?;
    }

    let document = ShadowDocument {
        desired: Value::Object(desired),
        reported: Value::Object(reported),
        desired_metadata: Value::Object(desired_meta),
        reported_metadata: Value::Object(reported_meta),
        version,
        timestamp: now,
    };

    let touched_state = PatchState {
        desired: (!touched_desired.is_empty()).then(|| Value::Object(touched_desired)),
        reported: (!touched_reported.is_empty()).then(|| Value::Object(touched_reported)),
    };
    let touched_metadata = PatchState {
        desired: (!touched_desired_meta.is_empty()).then(|| Value::Object(touched_desired_meta)),
        reported: (!touched_reported_meta.is_empty())
            .then(|| Value::Object(touched_reported_meta)),
    };

    Ok(MergeOutcome { document, touched_state, touched_metadata })
}

fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    }
}

#[allow(clippy::too_many_arguments)]
fn merge_object(
    current: &mut Map<String, Value>,
    patch: &Map<String, Value>,
    metadata: &mut Map<String, Value>,
    now: i64,
    touched: &mut Map<String, Value>,
    touched_meta: &mut Map<String, Value>,
    depth: usize,
    max_depth: usize,
) -> Result<(), ShadowError> {
    if depth >= max_depth {
        return Err(ShadowError::InvalidPayload(format!(
            "patch exceeds maximum nesting depth of {max_depth}"
        )));
    }

    for (key, patch_value) in patch {
        if patch_value.is_null() {
            current.remove(key);
            metadata.remove(key);
            touched.insert(key.clone(), Value::Null);
            continue;
        }

        if let Value::Object(patch_obj) = patch_value {
            let mut child = match current.remove(key) {
                Some(Value::Object(m)) => m,
                _ => Map::new(),
            };
            let mut child_meta = match metadata.remove(key) {
                Some(Value::Object(m)) => m,
                _ => Map::new(),
            };
            let mut child_touched = Map::new();
            let mut child_touched_meta = Map::new();

            merge_object(
                &mut child,
                patch_obj,
                &mut child_meta,
                now,
                &mut child_touched,
                &mut child_touched_meta,
                depth + 1,
                max_depth,
            )?;

            if !child.is_empty() {
                current.insert(key.clone(), Value::Object(child));
            }
            if !child_meta.is_empty() {
                metadata.insert(key.clone(), Value::Object(child_meta));
            }
            if !child_touched.is_empty() {
                touched.insert(key.clone(), Value::Object(child_touched));
            }
            if !child_touched_meta.is_empty() {
                touched_meta.insert(key.clone(), Value::Object(child_touched_meta));
            }
            continue;
        }

        current.insert(key.clone(), patch_value.clone());
        metadata.insert(key.clone(), json!({ "timestamp": now }));
        touched.insert(key.clone(), patch_value.clone());
        touched_meta.insert(key.clone(), json!({ "timestamp": now }));
    }

    Ok(())
}

/// Computes `delta = desired − reported` at leaf granularity.
///
/// Returns `None` when `desired` is absent or every leaf equals its
/// `reported` counterpart. The companion metadata delta carries, per
/// touched leaf, the more recent of the two sides' metadata timestamps.
#[must_use]
pub fn delta(document: &ShadowDocument) -> Option<(Value, Value)> {
    let desired = match &document.desired {
        Value::Object(m) => m,
        _ => return None,
    };
    let reported = match &document.reported {
        Value::Object(m) => m,
        _ => &Map::new().clone(),
    };
    let desired_meta = match &document.desired_metadata {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    };
    let reported_meta = match &document.reported_metadata {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    };

    let mut state_delta = Map::new();
    let mut meta_delta = Map::new();
    delta_object(desired, reported, &desired_meta, &reported_meta, &mut state_delta, &mut meta_delta);

    if state_delta.is_empty() {
        None
    } else {
        Some((Value::Object(state_delta), Value::Object(meta_delta)))
    }
}

fn delta_object(
    desired: &Map<String, Value>,
    reported: &Map<String, Value>,
    desired_meta: &Map<String, Value>,
    reported_meta: &Map<String, Value>,
    out: &mut Map<String, Value>,
    out_meta: &mut Map<String, Value>,
) {
    for (key, desired_value) in desired {
        let reported_value = reported.get(key);
        match (desired_value, reported_value) {
            (Value::Object(d_obj), Some(Value::Object(r_obj))) => {
                let d_meta = match desired_meta.get(key) {
                    Some(Value::Object(m)) => m.clone(),
                    _ => Map::new(),
                };
                let r_meta = match reported_meta.get(key) {
                    Some(Value::Object(m)) => m.clone(),
                    _ => Map::new(),
                };
                let mut child = Map::new();
                let mut child_meta = Map::new();
                delta_object(d_obj, r_obj, &d_meta, &r_meta, &mut child, &mut child_meta);
                if !child.is_empty() {
                    out.insert(key.clone(), Value::Object(child));
                    out_meta.insert(key.clone(), Value::Object(child_meta));
                }
            }
            (value, reported_value) if Some(value) != reported_value => {
                out.insert(key.clone(), value.clone());
                let ts = newer_timestamp(desired_meta.get(key), reported_meta.get(key));
                out_meta.insert(key.clone(), json!({ "timestamp": ts }));
            }
            _ => {}
        }
    }
}

fn newer_timestamp(a: Option<&Value>, b: Option<&Value>) -> i64 {
    let ts = |v: Option<&Value>| v.and_then(|m| m.get("timestamp")).and_then(Value::as_i64).unwrap_or(0);
    ts(a).max(ts(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sets_leaf_and_stamps_metadata() {
        let doc = ShadowDocument::new_empty(100);
        let patch = PatchState {
            reported: Some(json!({ "color": { "r": 255, "g": 255, "b": 255 } })),
            desired: None,
        };
        let outcome = merge(&doc, &patch, 1, 200, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(
            outcome.document.reported,
            json!({ "color": { "r": 255, "g": 255, "b": 255 } })
        );
        assert_eq!(outcome.document.version, 1);
        let meta = &outcome.document.reported_metadata["color"]["r"]["timestamp"];
        assert_eq!(meta, &json!(200));
    }

    #[test]
    fn test_null_deletes_leaf_and_cascades() {
        let mut doc = ShadowDocument::new_empty(100);
        doc.reported = json!({ "a": { "b": 1 } });
        doc.reported_metadata = json!({ "a": { "b": { "timestamp": 100 } } });

        let patch = PatchState { reported: Some(json!({ "a": { "b": null } })), desired: None };
        let outcome = merge(&doc, &patch, 2, 200, DEFAULT_MAX_DEPTH).unwrap();

        assert_eq!(outcome.document.reported, json!({}));
    }

    #[test]
    fn test_delta_computation() {
        let mut doc = ShadowDocument::new_empty(100);
        doc.desired = json!({ "x": 1 });
        doc.reported = json!({ "x": 0 });
        doc.desired_metadata = json!({ "x": { "timestamp": 100 } });
        doc.reported_metadata = json!({ "x": { "timestamp": 90 } });

        let (state_delta, _meta) = delta(&doc).unwrap();
        assert_eq!(state_delta, json!({ "x": 1 }));
    }

    #[test]
    fn test_delta_absent_when_equal() {
        let mut doc = ShadowDocument::new_empty(100);
        doc.desired = json!({ "x": 1 });
        doc.reported = json!({ "x": 1 });
        assert!(delta(&doc).is_none());
    }

    #[test]
    fn test_version_conflict() {
        let doc = ShadowDocument::new_empty(100);
        let err = validate_patch_version(Some(&doc), Some(5)).unwrap_err();
        assert_eq!(err, ShadowError::VersionConflict { expected: 2, actual: 5 });
    }

    #[test]
    fn test_version_auto_assigned() {
        let doc = ShadowDocument::new_empty(100);
        let v = validate_patch_version(Some(&doc), None).unwrap();
        assert_eq!(v, 2);
    }

    #[test]
    fn test_version_for_new_shadow() {
        let v = validate_patch_version(None, None).unwrap();
        assert_eq!(v, 1);
    }

    #[test]
    fn test_depth_exceeded() {
        let doc = ShadowDocument::new_empty(100);
        let deep = json!({ "a": { "b": { "c": { "d": { "e": { "f": { "g": 1 } } } } } } });
        let patch = PatchState { reported: Some(deep), desired: None };
        let err = merge(&doc, &patch, 1, 200, DEFAULT_MAX_DEPTH).unwrap_err();
        assert!(matches!(err, ShadowError::InvalidPayload(_)));
    }

    #[test]
    fn test_roundtrip_parse_to_json() {
        let mut doc = ShadowDocument::new_empty(100);
        doc.reported = json!({ "x": 1 });
        doc.reported_metadata = json!({ "x": { "timestamp": 100 } });
        doc.version = 3;

        let bytes = to_json(&doc, true);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.reported, doc.reported);
        assert_eq!(parsed.version, doc.version);
        assert_eq!(parsed.timestamp, doc.timestamp);
    }

    #[test]
    fn test_idempotent_patch_reapplication() {
        let doc = ShadowDocument::new_empty(100);
        let patch = PatchState { reported: Some(json!({ "x": 1 })), desired: None };
        let once = merge(&doc, &patch, 1, 200, DEFAULT_MAX_DEPTH).unwrap().document;
        let twice = merge(&once, &patch, 2, 200, DEFAULT_MAX_DEPTH).unwrap().document;
        assert_eq!(once.reported, twice.reported);
    }
}

/// Client token carried by an update payload, validated on ingestion.
pub fn parse_client_token(raw: Option<String>) -> Result<Option<ClientToken>, ShadowError> {
    raw.map(ClientToken::new).transpose()
}
