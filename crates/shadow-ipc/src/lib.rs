//! shadow-ipc - Local request-handler surface for the device shadow manager
//!
//! Provides:
//! - [`handlers::ShadowRequestHandlers`] - `UpdateThingShadow`,
//!   `GetThingShadow`, `DeleteThingShadow`, `ListNamedShadowsForThing`,
//!   and the [`shadow_core::ports::LocalMutator`] implementation the
//!   sync handler drives for inbound cloud changes
//! - [`rate_limit::InboundRateLimiter`] - the per-thing/aggregate
//!   token-bucket pair gating every local request
//! - [`pagination`] - opaque, tamper-resistant `nextToken` encode/decode

pub mod handlers;
pub mod pagination;
pub mod rate_limit;

pub use handlers::{NamedShadowsPage, ShadowRequestHandlers};
pub use rate_limit::InboundRateLimiter;
