//! The `RecordStore` and `Directory` traits and supporting query types.
//!
//! Both traits are implemented by storage backends (e.g. `cc-store-sqlite`).
//! The orchestrator in `cc-scan` depends on these abstractions, not on any
//! concrete backend.
//!
//! Absence is always `Ok(None)`. `Err` means the backend itself failed.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  entity::{Family, Individual, Institution, Tag, WorkflowType},
  lifecycle::StatusChange,
  record::{CcRecord, NewRecord, Status, SubjectRef},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Status constraint for [`RecordStore::find_active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
  #[default]
  Any,
  Exactly(Status),
}

impl StatusFilter {
  pub fn accepts(self, status: Status) -> bool {
    match self {
      Self::Any => true,
      Self::Exactly(s) => s == status,
    }
  }
}

/// Locate the record for one subject at one institution.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
  pub institution_id: String,
  pub subject:        SubjectRef,
  pub status:         StatusFilter,
  pub exclude:        Vec<Status>,
}

impl RecordQuery {
  /// The single active record of `subject` under `workflow`.
  pub fn active(
    institution_id: impl Into<String>,
    subject: SubjectRef,
    workflow: WorkflowType,
  ) -> Self {
    Self {
      institution_id: institution_id.into(),
      subject,
      status: StatusFilter::Any,
      exclude: workflow.excluded_statuses().to_vec(),
    }
  }

  pub fn accepts(&self, status: Status) -> bool {
    self.status.accepts(status) && !self.exclude.contains(&status)
  }
}

/// Parameters for [`RecordStore::list_records`].
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
  pub institution_id:  Option<String>,
  /// Matches the subject id of any kind (individual, dependent or tag).
  pub subject_id:      Option<String>,
  pub status:          Option<Status>,
  pub exclude:         Vec<Status>,
  pub created_after:   Option<DateTime<Utc>>,
  pub created_before:  Option<DateTime<Utc>>,
  /// Only records with at least one event at or above this temperature.
  pub min_temperature: Option<f32>,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

// ─── Write outcomes ──────────────────────────────────────────────────────────

/// Result of a create-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
  /// No active record existed; this one was just written.
  Inserted(CcRecord),
  /// Another writer got there first; this is the active record it created.
  Existing(CcRecord),
}

impl Created {
  pub fn was_inserted(&self) -> bool { matches!(self, Self::Inserted(_)) }

  pub fn into_record(self) -> CcRecord {
    match self {
      Self::Inserted(r) | Self::Existing(r) => r,
    }
  }
}

/// Result of a compare-and-swap advance.
#[derive(Debug, Clone, PartialEq)]
pub enum Advanced {
  Applied(CcRecord),
  /// The record was not in the expected status (or no longer exists).
  /// Nothing was written.
  Conflict { record_id: Uuid },
}

/// One element of [`RecordStore::advance_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAdvance {
  pub record_id: Uuid,
  pub expected:  Status,
  pub change:    StatusChange,
}

/// Result of an all-or-nothing batch advance.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchAdvanced {
  /// Every advance applied, in input order.
  Applied(Vec<CcRecord>),
  /// The first record whose status did not match. Nothing was written.
  Conflict { record_id: Uuid },
}

// ─── RecordStore ─────────────────────────────────────────────────────────────

/// Persistence contract for check-in / check-out records.
///
/// Implementations must guarantee:
///
/// - at most one *active* record per (institution, subject) at any time;
///   [`create_record`](Self::create_record) returns the existing one
///   instead of writing a second;
/// - [`append_event_and_advance`](Self::append_event_and_advance) and
///   [`advance_all`](Self::advance_all) write only if every record is still
///   in its expected status, atomically.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Scan path ─────────────────────────────────────────────────────────

  /// The record matching `query`, if any. Callers rely on the active-record
  /// invariant: with [`StatusFilter::Any`] and the workflow's exclusions at
  /// most one record can match.
  fn find_active(
    &self,
    query: RecordQuery,
  ) -> impl Future<Output = Result<Option<CcRecord>, Self::Error>> + Send + '_;

  /// Create a record in [`Status::Init`] with no events, unless the subject
  /// already has an active record.
  fn create_record(
    &self,
    input: NewRecord,
  ) -> impl Future<Output = Result<Created, Self::Error>> + Send + '_;

  /// Compare-and-swap: if the record's status is `expected`, write
  /// `change` (status, optional appended event, optional scheduled time).
  fn append_event_and_advance(
    &self,
    record_id: Uuid,
    expected: Status,
    change: StatusChange,
  ) -> impl Future<Output = Result<Advanced, Self::Error>> + Send + '_;

  /// Apply several compare-and-swap advances in one transaction.
  fn advance_all(
    &self,
    batch: Vec<PendingAdvance>,
  ) -> impl Future<Output = Result<BatchAdvanced, Self::Error>> + Send + '_;

  // ── Administration ────────────────────────────────────────────────────

  fn get_record(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<Option<CcRecord>, Self::Error>> + Send + '_;

  fn list_records<'a>(
    &'a self,
    filter: &'a RecordFilter,
  ) -> impl Future<Output = Result<Vec<CcRecord>, Self::Error>> + Send + 'a;

  /// Physically remove a record and its events. Returns `false` if it did
  /// not exist.
  fn delete_record(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Directory ───────────────────────────────────────────────────────────────

/// Institutions, people and tags.
///
/// The scan path only reads from it, apart from creating tags on first
/// sight. Registration methods exist for administration and tests.
pub trait Directory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Lookups ───────────────────────────────────────────────────────────

  fn get_institution(
    &self,
    institution_id: String,
  ) -> impl Future<Output = Result<Option<Institution>, Self::Error>> + Send + '_;

  fn institution_by_identifier(
    &self,
    identifier: String,
  ) -> impl Future<Output = Result<Option<Institution>, Self::Error>> + Send + '_;

  fn get_individual(
    &self,
    individual_id: String,
  ) -> impl Future<Output = Result<Option<Individual>, Self::Error>> + Send + '_;

  fn get_family(
    &self,
    family_id: String,
  ) -> impl Future<Output = Result<Option<Family>, Self::Error>> + Send + '_;

  /// The family a dependent belongs to.
  fn family_of_dependent(
    &self,
    dependent_id: String,
  ) -> impl Future<Output = Result<Option<Family>, Self::Error>> + Send + '_;

  /// Return the tag for `(institution_id, tag_string)`, creating it if this
  /// is the first time it is seen.
  fn get_or_create_tag(
    &self,
    institution_id: String,
    tag_string: String,
  ) -> impl Future<Output = Result<Tag, Self::Error>> + Send + '_;

  // ── Registration ──────────────────────────────────────────────────────

  fn add_institution(
    &self,
    institution: Institution,
  ) -> impl Future<Output = Result<Institution, Self::Error>> + Send + '_;

  fn add_individual(
    &self,
    individual: Individual,
  ) -> impl Future<Output = Result<Individual, Self::Error>> + Send + '_;

  /// Register a family together with its dependents.
  fn add_family(
    &self,
    family: Family,
  ) -> impl Future<Output = Result<Family, Self::Error>> + Send + '_;
}
