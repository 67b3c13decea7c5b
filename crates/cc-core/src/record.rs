//! The check-in / check-out record and the scan events attached to it.
//!
//! A record tracks one cycle of one subject at one institution. Its status
//! only moves forward (or to `Failed`), its events are append-only, and once
//! it reaches a terminal status it is never written again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::entity::{
  Dependent, Family, Individual, Tag, TrackedEntity, WorkflowType,
};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status of a record, in progression order.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
  Init,
  CheckInComplete,
  ScheduleComplete,
  CheckOutComplete,
  /// Screening failed. Reachable from every non-terminal status.
  Failed,
}

impl Status {
  /// No transition leaves a terminal status.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::CheckOutComplete | Self::Failed)
  }
}

// ─── Stage ───────────────────────────────────────────────────────────────────

/// The phase a scan pertains to. Wire form is `checkin` / `checkout`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
  CheckIn,
  CheckOut,
}

/// Whether a guardian scan applies to one dependent or the whole family.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FanOut {
  Single,
  All,
}

// ─── Scan readings ───────────────────────────────────────────────────────────

/// The hardware mode the scanner was in.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanType {
  #[default]
  Unspecified,
  CheckIn,
  CheckOut,
}

impl ScanType {
  /// Decode the integer code scanners post in the `scan_type` field.
  pub fn from_code(code: i64) -> Option<Self> {
    match code {
      0 => Some(Self::Unspecified),
      1 => Some(Self::CheckIn),
      2 => Some(Self::CheckOut),
      _ => None,
    }
  }
}

/// Measurements posted alongside the scan payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanReading {
  pub scan_type:     ScanType,
  /// Degrees Fahrenheit.
  pub temperature:   f32,
  pub face_covering: bool,
  pub device_id:     Option<String>,
}

// ─── Scan events ─────────────────────────────────────────────────────────────

/// Contact snapshot of the guardian who scanned, taken at scan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianInfo {
  pub individual_id: String,
  pub name:          String,
  pub phone_num:     Option<String>,
  pub relation:      Option<String>,
  pub group:         Option<String>,
}

impl From<&Individual> for GuardianInfo {
  fn from(guardian: &Individual) -> Self {
    Self {
      individual_id: guardian.individual_id.clone(),
      name:          guardian.display_name(),
      phone_num:     guardian.phone_num.clone(),
      relation:      guardian.family.as_ref().map(|f| f.relation.clone()),
      group:         guardian.group.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianEvent {
  pub guardian:   GuardianInfo,
  pub fan_out:    FanOut,
  pub stage:      Stage,
  pub reading:    ScanReading,
  pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberTagEvent {
  pub stage:      Stage,
  pub reading:    ScanReading,
  pub scanned_at: DateTime<Utc>,
}

/// One scan applied to a record. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanEvent {
  Guardian(GuardianEvent),
  MemberTag(MemberTagEvent),
}

impl ScanEvent {
  pub fn reading(&self) -> &ScanReading {
    match self {
      Self::Guardian(e) => &e.reading,
      Self::MemberTag(e) => &e.reading,
    }
  }

  pub fn stage(&self) -> Stage {
    match self {
      Self::Guardian(e) => e.stage,
      Self::MemberTag(e) => e.stage,
    }
  }

  pub fn scanned_at(&self) -> DateTime<Utc> {
    match self {
      Self::Guardian(e) => e.scanned_at,
      Self::MemberTag(e) => e.scanned_at,
    }
  }
}

// ─── Subjects ────────────────────────────────────────────────────────────────

/// The kind of party a record tracks.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubjectKind {
  Individual,
  Dependent,
  Tag,
}

/// Identifies a subject within an institution.
///
/// For tags the id is the tag string, which is unique per institution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
  pub kind: SubjectKind,
  pub id:   String,
}

impl SubjectRef {
  pub fn individual(id: impl Into<String>) -> Self {
    Self { kind: SubjectKind::Individual, id: id.into() }
  }

  pub fn dependent(id: impl Into<String>) -> Self {
    Self { kind: SubjectKind::Dependent, id: id.into() }
  }

  pub fn tag(tag_string: impl Into<String>) -> Self {
    Self { kind: SubjectKind::Tag, id: tag_string.into() }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualSnapshot {
  pub individual_id: String,
  pub name:          String,
  pub phone_num:     Option<String>,
  pub email:         Option<String>,
  pub group:         Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentSnapshot {
  pub dependent_id: String,
  pub family_id:    String,
  pub name:         String,
  pub group:        Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSnapshot {
  pub tag_id:     Uuid,
  pub tag_string: String,
}

/// What a record is about, captured when the record is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordSubject {
  Individual(IndividualSnapshot),
  Dependent(DependentSnapshot),
  Tag(TagSnapshot),
}

impl RecordSubject {
  pub fn subject_ref(&self) -> SubjectRef {
    match self {
      Self::Individual(s) => SubjectRef::individual(&s.individual_id),
      Self::Dependent(s) => SubjectRef::dependent(&s.dependent_id),
      Self::Tag(s) => SubjectRef::tag(&s.tag_string),
    }
  }
}

impl From<&TrackedEntity> for RecordSubject {
  fn from(entity: &TrackedEntity) -> Self {
    match entity {
      TrackedEntity::Individual(i) => Self::Individual(IndividualSnapshot {
        individual_id: i.individual_id.clone(),
        name:          i.display_name(),
        phone_num:     i.phone_num.clone(),
        email:         i.email.clone(),
        group:         i.group.clone(),
      }),
      TrackedEntity::Dependent { family, dependent } => {
        Self::Dependent(DependentSnapshot {
          dependent_id: dependent.dependent_id.clone(),
          family_id:    family.family_id.clone(),
          name:         dependent.display_name(),
          group:        dependent.group.clone(),
        })
      }
      TrackedEntity::Tag(t) => Self::Tag(TagSnapshot {
        tag_id:     t.tag_id,
        tag_string: t.tag_string.clone(),
      }),
    }
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One presence cycle of one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcRecord {
  pub record_id:          Uuid,
  pub institution_id:     String,
  /// Workflow of the institution when the record was created.
  pub workflow:           WorkflowType,
  pub subject:            RecordSubject,
  pub status:             Status,
  /// Append-only; append order is chronological order.
  pub events:             Vec<ScanEvent>,
  pub scheduled_checkout: Option<DateTime<Utc>>,
  pub created_at:         DateTime<Utc>,
}

impl CcRecord {
  pub fn is_active(&self) -> bool { self.workflow.is_active(self.status) }
}

/// Input to [`crate::store::RecordStore::create_record`]. The store assigns
/// the id and creation time; status always starts at [`Status::Init`].
#[derive(Debug, Clone)]
pub struct NewRecord {
  pub institution_id: String,
  pub workflow:       WorkflowType,
  pub subject:        RecordSubject,
}

impl NewRecord {
  pub fn new(
    institution_id: impl Into<String>,
    workflow: WorkflowType,
    entity: &TrackedEntity,
  ) -> Self {
    Self {
      institution_id: institution_id.into(),
      workflow,
      subject: RecordSubject::from(entity),
    }
  }

  pub fn for_individual(individual: &Individual, workflow: WorkflowType) -> Self {
    Self::new(
      individual.institution_id.clone(),
      workflow,
      &TrackedEntity::Individual(individual.clone()),
    )
  }

  pub fn for_dependent(
    family: &Family,
    dependent: &Dependent,
    workflow: WorkflowType,
  ) -> Self {
    Self::new(
      family.institution_id.clone(),
      workflow,
      &TrackedEntity::Dependent {
        family:    family.clone(),
        dependent: dependent.clone(),
      },
    )
  }

  pub fn for_tag(tag: &Tag, workflow: WorkflowType) -> Self {
    Self::new(
      tag.institution_id.clone(),
      workflow,
      &TrackedEntity::Tag(tag.clone()),
    )
  }
}
