//! Storyboard Billing - payment webhooks, credit ledger and identity sync
//!
//! This crate reconciles payment-provider webhooks into user subscription
//! state and credit balances, keeps user rows in step with the identity
//! provider, and serves the account reads the storyboard studio needs.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
