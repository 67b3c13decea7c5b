//! Scan orchestration for the check-in / check-out tracker.
//!
//! [`ScanService`] turns one raw scan into record transitions: it parses the
//! payload, resolves the subject through a [`cc_core::store::Directory`],
//! finds or creates the active record, screens the reading and advances the
//! record with a compare-and-swap. It is generic over any backend that
//! implements both [`cc_core::store::RecordStore`] and `Directory`.
//!
//! Every backend call is bounded by [`ScanConfig::store_timeout`]; a slow or
//! failing backend surfaces as [`cc_core::Error::Unavailable`].

mod bounded;
pub mod config;
pub mod outcome;
pub mod resolve;
pub mod service;

pub use config::ScanConfig;
pub use outcome::{RecordRef, ScanOutcome, SyncRequest};
pub use service::ScanService;
