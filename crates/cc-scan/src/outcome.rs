//! What the orchestrator hands back to the transport layer.

use cc_core::{
  record::{CcRecord, Stage, Status},
  screening::Screening,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record touched by a scan, in its resulting status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
  pub record_id: Uuid,
  pub status:    Status,
}

impl From<&CcRecord> for RecordRef {
  fn from(record: &CcRecord) -> Self {
    Self { record_id: record.record_id, status: record.status }
  }
}

/// Result of a scan that was applied.
///
/// `success` is `false` when screening failed; the records then sit in
/// [`Status::Failed`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
  pub success:   bool,
  pub stage:     Stage,
  pub screening: Screening,
  pub records:   Vec<RecordRef>,
}

/// Get-or-create the active records of one individual or several
/// dependents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
  pub institution_id: String,
  #[serde(default)]
  pub individual_id:  Option<String>,
  #[serde(default)]
  pub dependent_ids:  Vec<String>,
}
