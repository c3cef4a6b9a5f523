//! Three-way reconciliation merge
//!
//! Used by the `FullSync` request kind to reconcile a local and a cloud
//! document against their last-known-common ancestor (or an implicit
//! empty ancestor on a shadow's very first sync). Per leaf: if exactly
//! one side differs from the ancestor, that side wins outright; if both
//! differ and disagree, `desired` resolves to the cloud's value and
//! `reported` resolves to the local value, since `desired` is authored
//! externally and `reported` reflects device truth.

use serde_json::{Map, Value};

use shadow_core::domain::ShadowDocument;

/// Which section a leaf belongs to, controlling conflict resolution.
#[derive(Clone, Copy)]
enum Section {
    Desired,
    Reported,
}

/// Merges `local` and `cloud` against `ancestor` (an empty document when
/// this is a shadow's first sync), producing the reconciled document at
/// `version` stamped with `now`.
#[must_use]
pub fn reconcile(ancestor: Option<&ShadowDocument>, local: &ShadowDocument, cloud: &ShadowDocument, version: u64, now: i64) -> ShadowDocument {
    let empty = Value::Object(Map::new());
    let (anc_desired, anc_desired_meta, anc_reported, anc_reported_meta) = match ancestor {
        Some(a) => (&a.desired, &a.desired_metadata, &a.reported, &a.reported_metadata),
        None => (&empty, &empty, &empty, &empty),
    };

    let (desired, desired_metadata) = merge_section(
        Section::Desired,
        anc_desired,
        &local.desired,
        &cloud.desired,
        anc_desired_meta,
        &local.desired_metadata,
        &cloud.desired_metadata,
        now,
    );
    let (reported, reported_metadata) = merge_section(
        Section::Reported,
        anc_reported,
        &local.reported,
        &cloud.reported,
        anc_reported_meta,
        &local.reported_metadata,
        &cloud.reported_metadata,
        now,
    );

    ShadowDocument { desired, reported, desired_metadata, reported_metadata, version, timestamp: now }
}

#[allow(clippy::too_many_arguments)]
fn merge_section(
    section: Section,
    ancestor: &Value,
    local: &Value,
    cloud: &Value,
    ancestor_meta: &Value,
    local_meta: &Value,
    cloud_meta: &Value,
    now: i64,
) -> (Value, Value) {
    let ancestor = as_object(ancestor);
    let local = as_object(local);
    let cloud = as_object(cloud);
    let ancestor_meta = as_object(ancestor_meta);
    let local_meta = as_object(local_meta);
    let cloud_meta = as_object(cloud_meta);

    let mut keys: Vec<&String> = local.keys().chain(cloud.keys()).chain(ancestor.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut state = Map::new();
    let mut meta = Map::new();

    for key in keys {
        let a = ancestor.get(key);
        let l = local.get(key);
        let c = cloud.get(key);

        if matches!((l, c), (Some(Value::Object(_)) | None, Some(Value::Object(_)) | None))
            && (matches!(l, Some(Value::Object(_))) || matches!(c, Some(Value::Object(_))))
        {
            let a_child = a.cloned().unwrap_or_else(|| Value::Object(Map::new()));
            let l_child = l.cloned().unwrap_or_else(|| Value::Object(Map::new()));
            let c_child = c.cloned().unwrap_or_else(|| Value::Object(Map::new()));
            let a_meta_child = ancestor_meta.get(key).cloned().unwrap_or_else(|| Value::Object(Map::new()));
            let l_meta_child = local_meta.get(key).cloned().unwrap_or_else(|| Value::Object(Map::new()));
            let c_meta_child = cloud_meta.get(key).cloned().unwrap_or_else(|| Value::Object(Map::new()));

            let (child_state, child_meta) = merge_section(
                section,
                &a_child,
                &l_child,
                &c_child,
                &a_meta_child,
                &l_meta_child,
                &c_meta_child,
                now,
            );
            if let Value::Object(ref m) = child_state {
                if !m.is_empty() {
                    state.insert(key.clone(), child_state);
                }
            }
            if let Value::Object(ref m) = child_meta {
                if !m.is_empty() {
                    meta.insert(key.clone(), child_meta);
                }
            }
            continue;
        }

        let local_differs = l != a;
        let cloud_differs = c != a;

        let (winner, winner_meta) = match (local_differs, cloud_differs) {
            (false, false) => (a.cloned(), a_meta_or_now(ancestor_meta.get(key), now)),
            (true, false) => (l.cloned(), local_meta.get(key).cloned().unwrap_or_else(|| now_meta(now))),
            (false, true) => (c.cloned(), cloud_meta.get(key).cloned().unwrap_or_else(|| now_meta(now))),
            (true, true) => {
                if l == c {
                    (l.cloned(), local_meta.get(key).cloned().unwrap_or_else(|| now_meta(now)))
                } else {
                    match section {
                        Section::Desired => (c.cloned(), cloud_meta.get(key).cloned().unwrap_or_else(|| now_meta(now))),
                        Section::Reported => (l.cloned(), local_meta.get(key).cloned().unwrap_or_else(|| now_meta(now))),
                    }
                }
            }
        };

        if let Some(value) = winner {
            state.insert(key.clone(), value);
            meta.insert(key.clone(), winner_meta);
        }
    }

    (Value::Object(state), Value::Object(meta))
}

fn a_meta_or_now(meta: Option<&Value>, now: i64) -> Value {
    meta.cloned().unwrap_or_else(|| now_meta(now))
}

fn now_meta(now: i64) -> Value {
    serde_json::json!({ "timestamp": now })
}

fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    }
}
