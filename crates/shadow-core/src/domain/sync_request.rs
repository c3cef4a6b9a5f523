//! Sync request taxonomy
//!
//! The sync handler's per-shadow queues hold values of this type. Two
//! requests queued for the same key may be merged rather than appended
//! (see [`SyncRequest::merge_onto`]); the merge rules are chosen so the
//! net effect on the cloud side is equivalent to applying both requests
//! in order, never less.

use serde_json::Value;

use super::document::PatchState;

/// A single request awaiting execution against the cloud or the local
/// store, keyed implicitly by the `(thing, shadow)` queue it lives in.
#[derive(Debug, Clone)]
pub enum SyncRequest {
    /// An inbound cloud notification carrying a new reported/desired
    /// patch and the version it was published at.
    LocalUpdate {
        /// The version the cloud side published this update at.
        version: u64,
        /// The patch to apply locally.
        patch: PatchState,
    },
    /// An inbound cloud deletion notification.
    LocalDelete {
        /// The version the cloud side published the delete at.
        version: u64,
    },
    /// A local write that needs to be pushed to the cloud.
    CloudUpdate {
        /// The patch that was applied locally and must be propagated.
        patch: PatchState,
    },
    /// A local delete that needs to be propagated to the cloud.
    CloudDelete,
    /// Full-shadow reconciliation: fetch both sides and merge.
    FullSync,
    /// Push the local document to the cloud unconditionally, discarding
    /// the cloud side. Used when `direction = deviceToCloud`.
    OverwriteCloud,
    /// Pull the cloud document to the local store unconditionally,
    /// discarding the local side. Used when `direction = cloudToDevice`.
    OverwriteLocal,
}

impl SyncRequest {
    /// A short tag for logging, matching the variant name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocalUpdate { .. } => "LocalUpdate",
            Self::LocalDelete { .. } => "LocalDelete",
            Self::CloudUpdate { .. } => "CloudUpdate",
            Self::CloudDelete => "CloudDelete",
            Self::FullSync => "FullSync",
            Self::OverwriteCloud => "OverwriteCloud",
            Self::OverwriteLocal => "OverwriteLocal",
        }
    }

    /// Attempts to merge `incoming` onto `self`, which sits at the tail
    /// of the key's queue. Returns `Some(merged)` to replace the tail
    /// entry, or `None` when the two requests do not merge and
    /// `incoming` should be appended as a new tail entry instead.
    ///
    /// Merge rules (§4.6):
    /// - Two `CloudUpdate`s coalesce, keeping the latest patch.
    /// - A `FullSync` absorbs any other request for the same key.
    /// - A `CloudDelete` following a `CloudUpdate` replaces it.
    #[must_use]
    pub fn merge_onto(&self, incoming: &SyncRequest) -> Option<SyncRequest> {
        match (self, incoming) {
            (Self::FullSync, _) => Some(Self::FullSync),
            (_, Self::FullSync) => Some(Self::FullSync),
            (Self::CloudUpdate { .. }, Self::CloudUpdate { patch }) => {
                Some(Self::CloudUpdate { patch: patch.clone() })
            }
            (Self::CloudUpdate { .. }, Self::CloudDelete) => Some(Self::CloudDelete),
            _ => None,
        }
    }
}

/// Policy controlling which side may drive mutations onto the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Both local writes and cloud notifications may mutate the other side.
    #[default]
    BetweenDeviceAndCloud,
    /// Only local writes propagate to the cloud; inbound cloud events
    /// are dropped before they reach a local mutation.
    DeviceToCloud,
    /// Only cloud notifications propagate to the device; local writes
    /// never trigger a cloud call.
    CloudToDevice,
}

impl Direction {
    /// Parses the configured direction string, defaulting to
    /// `BetweenDeviceAndCloud` for anything unrecognized.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "deviceToCloud" => Self::DeviceToCloud,
            "cloudToDevice" => Self::CloudToDevice,
            _ => Self::BetweenDeviceAndCloud,
        }
    }

    /// Returns whether `request` is compatible with this direction. An
    /// incompatible request must be dropped at enqueue time rather than
    /// queued.
    #[must_use]
    pub fn allows(&self, request: &SyncRequest) -> bool {
        match self {
            Self::BetweenDeviceAndCloud => true,
            Self::DeviceToCloud => !matches!(
                request,
                SyncRequest::LocalUpdate { .. } | SyncRequest::LocalDelete { .. }
            ),
            Self::CloudToDevice => !matches!(
                request,
                SyncRequest::CloudUpdate { .. } | SyncRequest::CloudDelete
            ),
        }
    }
}

/// Used by [`delta`](super::document::delta) consumers to check for an
/// empty patch section without constructing a full `Value`.
#[must_use]
pub fn is_empty_state(value: &Option<Value>) -> bool {
    match value {
        None => true,
        Some(Value::Object(m)) => m.is_empty(),
        Some(_) => false,
    }
}
