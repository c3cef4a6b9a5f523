//! Local mutator port (driven/secondary port)
//!
//! The sync handler needs to apply inbound cloud changes (`LocalUpdate`,
//! `LocalDelete`) through the exact same validated, locked, published
//! code path a direct local call uses. Rather than the sync handler
//! depending on the request-handler crate directly — which would create
//! a cyclic dependency, since the handlers crate also enqueues sync
//! requests into the sync handler — this interface is defined here and
//! implemented by the request handlers; the sync handler depends only
//! on this trait (see the design note on avoiding mutual module
//! dependency).

use crate::domain::document::PatchState;
use crate::domain::newtypes::ShadowKey;
use crate::domain::ShadowError;

/// Port trait consumed by the sync handler to apply inbound cloud
/// changes through the local request-handler path.
#[async_trait::async_trait]
pub trait LocalMutator: Send + Sync {
    /// Applies an inbound cloud update, exactly as if a local caller
    /// had issued it, including publish fan-out, but without enqueuing
    /// a new `CloudUpdate` (the caller is already inside the sync path).
    async fn apply_local_update(
        &self,
        key: &ShadowKey,
        version: u64,
        patch: &PatchState,
    ) -> Result<(), ShadowError>;

    /// Applies an inbound cloud delete, exactly as if a local caller had
    /// issued it.
    async fn apply_local_delete(&self, key: &ShadowKey, version: u64) -> Result<(), ShadowError>;
}
