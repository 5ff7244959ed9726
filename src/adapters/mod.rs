//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - axum routes for the billing and identity webhooks and account reads
//! - `memory` - in-memory stores for tests and database-less runs
//! - `postgres` - sqlx-backed repositories

pub mod http;
pub mod memory;
pub mod postgres;
