//! Authorization port (driven/secondary port)
//!
//! Policy evaluation itself is out of scope (§1); this module defines
//! only the interface request handlers consume.

use crate::domain::newtypes::ShadowKey;

/// Port trait for the external authorization collaborator.
#[async_trait::async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(())` if the caller is authorized to act on
    /// `key.resource_id()`, `Err(())` otherwise.
    ///
    /// The resource identifier convention is `"<thing>/shadow"` for the
    /// classic shadow and `"<thing>/shadow/<name>"` for named shadows.
    async fn authorize(&self, caller: &str, key: &ShadowKey) -> Result<(), ()>;
}
