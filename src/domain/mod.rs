//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `credits` - Credit ledger entries and balance arithmetic
//! - `user` - User record, subscription fields and identity-provider profile
//! - `billing` - Webhook verification and processing, plans, credit policy

pub mod billing;
pub mod credits;
pub mod foundation;
pub mod user;
