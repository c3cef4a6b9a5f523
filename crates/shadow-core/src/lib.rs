//! shadow-core - Domain logic and port definitions for the shadow manager
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain model** - `ShadowDocument`, `SyncInfo`, `SyncRequest`, the
//!   validated key newtypes, and the error taxonomy
//! - **Port definitions** - Traits for adapters: `LocalStore`,
//!   `CloudDataPlane`, `Publisher`, `Authorizer`, `LocalMutator`
//! - **Configuration** - Typed config with YAML loading and validation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external
//! dependencies (no I/O, no tokio). Ports define the trait interfaces that
//! adapter crates (`shadow-store`, `shadow-cloud`, `shadow-ipc`) implement.

pub mod config;
pub mod domain;
pub mod ports;
