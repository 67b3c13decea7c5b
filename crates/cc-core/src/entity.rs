//! Directory entities — the parties a scan can refer to and the institutions
//! that own them.
//!
//! None of these are written by the scan path. The directory is read-only
//! from the orchestrator's point of view, except for tags which are created
//! on first sight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::record::Status;

// ─── Institution ─────────────────────────────────────────────────────────────

/// Which statuses still count as "in progress" for an institution.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowType {
  /// Check-in, optional schedule, check-out.
  #[default]
  FullCycle,
  /// A single check-in closes the cycle.
  CheckInOnly,
}

impl WorkflowType {
  /// Statuses that drop a record out of the active-record search.
  pub fn excluded_statuses(self) -> &'static [Status] {
    match self {
      Self::FullCycle => &[Status::CheckOutComplete, Status::Failed],
      Self::CheckInOnly => &[Status::CheckInComplete, Status::Failed],
    }
  }

  pub fn is_active(self, status: Status) -> bool {
    !self.excluded_statuses().contains(&status)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
  pub institution_id:             String,
  /// External identifier printed into tag payloads.
  pub identifier:                 String,
  pub name:                       String,
  pub workflow:                   WorkflowType,
  /// Screen temperature on checkout scans as well as check-in.
  #[serde(default)]
  pub require_checkout_screening: bool,
}

// ─── People ──────────────────────────────────────────────────────────────────

/// Link from an individual to the family they act as guardian for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyLink {
  pub family_id: String,
  /// How the individual relates to the dependents, e.g. "mother".
  pub relation:  String,
}

/// A person who scans their own badge, and possibly a family's guardian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
  pub individual_id:  String,
  pub institution_id: String,
  pub first_name:     String,
  pub last_name:      String,
  #[serde(default)]
  pub phone_num:      Option<String>,
  #[serde(default)]
  pub email:          Option<String>,
  #[serde(default)]
  pub group:          Option<String>,
  #[serde(default)]
  pub family:         Option<FamilyLink>,
}

impl Individual {
  pub fn display_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}

/// A person checked in and out by a guardian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependent {
  pub dependent_id: String,
  pub first_name:   String,
  pub last_name:    String,
  #[serde(default)]
  pub group:        Option<String>,
}

impl Dependent {
  pub fn display_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}

/// An ordered set of dependents under one guardian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
  pub family_id:      String,
  pub institution_id: String,
  pub guardian_id:    String,
  pub dependents:     Vec<Dependent>,
}

impl Family {
  pub fn dependent(&self, dependent_id: &str) -> Option<&Dependent> {
    self
      .dependents
      .iter()
      .find(|d| d.dependent_id == dependent_id)
  }
}

// ─── Tags ────────────────────────────────────────────────────────────────────

/// An anonymous badge. Carries no personal data; the natural key is
/// `(institution_id, tag_string)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
  pub tag_id:         Uuid,
  pub institution_id: String,
  pub tag_string:     String,
  pub created_at:     DateTime<Utc>,
}

// ─── TrackedEntity ───────────────────────────────────────────────────────────

/// Anything a record can track.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedEntity {
  Individual(Individual),
  Dependent { family: Family, dependent: Dependent },
  Tag(Tag),
}
