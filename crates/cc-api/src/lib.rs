//! HTTP adapter for the check-in / check-out tracker.
//!
//! Exposes an axum [`Router`] backed by a [`ScanService`] over any store
//! implementing [`RecordStore`] and [`Directory`]. TLS and auth are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .merge(cc_api::api_router(service.clone(), config.server_address.clone()))
//! ```

pub mod directory;
pub mod error;
pub mod records;
pub mod scans;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use cc_core::store::{Directory, RecordStore};
use cc_scan::ScanService;

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub scans:       Arc<ScanService<S>>,
  /// Base URL that survey page links are built on. No links when `None`.
  pub survey_base: Option<Arc<str>>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      scans:       Arc::clone(&self.scans),
      survey_base: self.survey_base.clone(),
    }
  }
}

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be merged or nested into any parent router
/// regardless of its own state type.
pub fn api_router<S>(
  scans: Arc<ScanService<S>>,
  survey_base: Option<String>,
) -> Router<()>
where
  S: RecordStore + Directory + 'static,
{
  let state = AppState { scans, survey_base: survey_base.map(Arc::from) };

  Router::new()
    // Scanners
    .route("/scans", post(scans::handler::<S>))
    // Records
    .route("/records", get(records::list::<S>))
    .route("/records/schedule", post(records::schedule::<S>))
    .route("/records/sync", post(records::sync::<S>))
    .route(
      "/records/{id}",
      get(records::get_one::<S>).delete(records::delete_one::<S>),
    )
    // Directory
    .route("/institutions", post(directory::create_institution::<S>))
    .route("/institutions/{id}", get(directory::get_institution::<S>))
    .route("/individuals", post(directory::create_individual::<S>))
    .route("/families", post(directory::create_family::<S>))
    .with_state(state)
}
