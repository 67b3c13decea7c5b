//! Core types and decision logic for the check-in / check-out tracker.
//!
//! This crate is deliberately free of HTTP, database and runtime
//! dependencies. It holds the scan payload grammar, the record status state
//! machine, the screening policy, and the traits a persistence backend must
//! implement. Everything else depends on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod payload;
pub mod record;
pub mod screening;
pub mod store;

pub use error::{Error, Result};
