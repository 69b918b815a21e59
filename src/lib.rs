//! # Fiacre - Rental Management for Tesla Vehicles
//!
//! A self-hosted rental desk for privately owned Tesla vehicles: operators
//! register owner-API credentials, schedule time-boxed rentals, and hand each
//! renter an unguessable code that unlocks a narrow remote-control API for
//! exactly the rental window.
//!
//! ## Features
//!
//! - **Capability codes**: renters authenticate with a per-rental UUID, no
//!   accounts needed
//! - **Boundary odometers**: a background worker wakes the vehicle at rental
//!   start and end and records the odometer exactly once
//! - **Sleep friendly polling**: telemetry fetches skip vehicles that are
//!   provably idle, so cars can actually fall asleep
//! - **Snapshot log**: every fetched state document is kept and drives the
//!   charge, daily and raw statistics projections
//! - **Encrypted tokens**: OAuth tokens rest AES-256-GCM encrypted under an
//!   operator supplied secret
//! - **Metrics**: Prometheus-style text endpoint for alerting on stale data
//!   and expiring credentials
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `crypt`: Token encryption at rest
//! - `store`: SQLite-backed stores for credentials, vehicles, rentals and snapshots
//! - `tesla`: Owner API client, OAuth helpers and command catalog
//! - `telemetry`: Typed views over raw state documents
//! - `tokens`: Credential lifecycle and token refresh
//! - `registry`: Account to vehicle reconciliation
//! - `fetch`: Polling with the idle-skip policy and wake fallbacks
//! - `scheduler`: Rental boundary worker
//! - `stats`: Derived statistics over the snapshot log
//! - `ops`: Wake, command and confirm compositions
//! - `web`: HTTP server for the renter and manage APIs

pub mod config;
pub mod crypt;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod ops;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod tesla;
pub mod tokens;
pub mod web;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use error::{FiacreError, Result};
