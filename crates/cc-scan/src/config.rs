//! Service-wide scan settings.

use std::time::Duration;

use cc_core::{
  payload::Strictness,
  screening::{DEFAULT_THRESHOLD, ScreeningPolicy},
};
use serde::{Deserialize, Serialize};

/// Tunables passed to [`crate::ScanService`] at construction.
///
/// Every field has a default, so an empty `[scan]` table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
  /// Check-in is refused at or above this temperature (°F).
  #[serde(default = "default_threshold")]
  pub temperature_threshold:      f32,
  /// Screen checkout scans for every institution, whatever its own flag.
  #[serde(default)]
  pub require_checkout_screening: bool,
  #[serde(default)]
  pub strictness:                 Strictness,
  /// Upper bound on each store or directory call.
  #[serde(default = "default_store_timeout_ms")]
  pub store_timeout_ms:           u64,
}

fn default_threshold() -> f32 { DEFAULT_THRESHOLD }

fn default_store_timeout_ms() -> u64 { 5_000 }

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      temperature_threshold:      default_threshold(),
      require_checkout_screening: false,
      strictness:                 Strictness::default(),
      store_timeout_ms:           default_store_timeout_ms(),
    }
  }
}

impl ScanConfig {
  pub fn store_timeout(&self) -> Duration {
    Duration::from_millis(self.store_timeout_ms)
  }

  /// The service-wide policy, before any institution override.
  pub fn screening(&self) -> ScreeningPolicy {
    ScreeningPolicy {
      threshold:                  self.temperature_threshold,
      require_checkout_screening: self.require_checkout_screening,
    }
  }
}
