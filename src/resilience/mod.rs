//! Resilience helpers.
//!
//! # Design Decisions
//! - Retrying failed accepts waits with capped exponential backoff so a
//!   persistent listener fault (e.g. descriptor exhaustion) cannot spin
//! - Retries of remote calls are the caller's business, not this crate's

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
