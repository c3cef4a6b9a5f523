//! shadow-cloud - Cloud data-plane clients for the device shadow manager
//!
//! Provides:
//! - [`http::HttpCloudDataPlane`] - the HTTP GET/POST/DELETE data plane
//!   implementing [`shadow_core::ports::CloudDataPlane`]
//! - [`mqtt::CloudDataClient`] - the MQTT subscription/inbound-dispatch
//!   client, also the production [`shadow_core::ports::Publisher`] adapter
//! - [`topic`] - wire topic construction and parsing shared by both

pub mod http;
pub mod mqtt;
pub mod topic;

pub use http::HttpCloudDataPlane;
pub use mqtt::CloudDataClient;
