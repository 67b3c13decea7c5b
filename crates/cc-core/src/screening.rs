//! Temperature screening.
//!
//! Check-in is inclusive at the threshold (`>=` fails). Checkout is only
//! screened when required, and then strictly above the threshold fails.

use serde::{Deserialize, Serialize};

use crate::record::{ScanReading, Stage};

/// The body temperature at or above which a check-in is refused, in °F.
pub const DEFAULT_THRESHOLD: f32 = 99.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
  Pass,
  Fail,
}

impl Verdict {
  pub fn passed(self) -> bool { self == Self::Pass }
}

/// Check-in rule: fail when `temperature >= threshold`, or when the reading
/// is not a finite number.
pub fn evaluate(temperature: f32, threshold: f32) -> Verdict {
  if !temperature.is_finite() || temperature >= threshold {
    Verdict::Fail
  } else {
    Verdict::Pass
  }
}

/// The outcome of screening one scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Screening {
  pub verdict:       Verdict,
  pub temperature:   f32,
  pub face_covering: bool,
}

/// Screening configuration for one scan, after institution overrides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreeningPolicy {
  pub threshold:                  f32,
  pub require_checkout_screening: bool,
}

impl Default for ScreeningPolicy {
  fn default() -> Self {
    Self {
      threshold:                  DEFAULT_THRESHOLD,
      require_checkout_screening: false,
    }
  }
}

impl ScreeningPolicy {
  /// Tighten the policy with an institution's own checkout requirement.
  pub fn for_institution(self, require_checkout_screening: bool) -> Self {
    Self {
      require_checkout_screening: self.require_checkout_screening
        || require_checkout_screening,
      ..self
    }
  }

  pub fn verdict(&self, stage: Stage, temperature: f32) -> Verdict {
    match stage {
      Stage::CheckIn => evaluate(temperature, self.threshold),
      Stage::CheckOut if !self.require_checkout_screening => Verdict::Pass,
      Stage::CheckOut if !temperature.is_finite() => Verdict::Fail,
      Stage::CheckOut if temperature > self.threshold => Verdict::Fail,
      Stage::CheckOut => Verdict::Pass,
    }
  }

  pub fn screen(&self, stage: Stage, reading: &ScanReading) -> Screening {
    Screening {
      verdict:       self.verdict(stage, reading.temperature),
      temperature:   reading.temperature,
      face_covering: reading.face_covering,
    }
  }
}
