//! shadow-store - Local shadow document persistence
//!
//! SQLite-based implementation of [`shadow_core::ports::LocalStore`]:
//! - Shadow documents, soft-deleted on `delete` so a subsequent
//!   resurrection can continue from the tombstoned version
//! - Per-shadow sync bookkeeping (`SyncInfo`)
//! - Opportunistic disk-quota enforcement against
//!   `maxDiskUtilizationMegaBytes`

mod pool;
mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteLocalStore;
