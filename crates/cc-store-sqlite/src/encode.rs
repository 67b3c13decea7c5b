//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Enums are stored as their
//! `snake_case` names. Subject snapshots and scan events are stored as
//! compact JSON. UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use cc_core::{
  entity::{
    Dependent, Family, FamilyLink, Individual, Institution, Tag, WorkflowType,
  },
  record::{CcRecord, RecordSubject, ScanEvent, Status},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_status(s: Status) -> &'static str { s.into() }

pub fn decode_status(s: &str) -> Result<Status> {
  Status::from_str(s).map_err(|_| Error::Decode {
    column: "status",
    value:  s.to_owned(),
  })
}

pub fn encode_workflow(w: WorkflowType) -> &'static str { w.into() }

pub fn decode_workflow(s: &str) -> Result<WorkflowType> {
  WorkflowType::from_str(s).map_err(|_| Error::Decode {
    column: "workflow",
    value:  s.to_owned(),
  })
}

// ─── Record rows ─────────────────────────────────────────────────────────────

/// Columns selected by every record query, in [`RawRecord::from_row`] order.
pub const RECORD_COLUMNS: &str = "record_id, institution_id, workflow, \
                                  subject_json, status, scheduled_checkout, \
                                  created_at";

/// Raw strings read directly from a `cc_records` row plus its events.
pub struct RawRecord {
  pub record_id:          String,
  pub institution_id:     String,
  pub workflow:           String,
  pub subject_json:       String,
  pub status:             String,
  pub scheduled_checkout: Option<String>,
  pub created_at:         String,
  /// `event_json` of every attached event, in `seq` order.
  pub events:             Vec<String>,
}

impl RawRecord {
  /// Read the [`RECORD_COLUMNS`]; events are filled in separately.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:          row.get(0)?,
      institution_id:     row.get(1)?,
      workflow:           row.get(2)?,
      subject_json:       row.get(3)?,
      status:             row.get(4)?,
      scheduled_checkout: row.get(5)?,
      created_at:         row.get(6)?,
      events:             Vec::new(),
    })
  }

  pub fn into_record(self) -> Result<CcRecord> {
    let subject: RecordSubject = serde_json::from_str(&self.subject_json)?;
    let events = self
      .events
      .iter()
      .map(|e| serde_json::from_str::<ScanEvent>(e))
      .collect::<serde_json::Result<Vec<_>>>()?;

    Ok(CcRecord {
      record_id: decode_uuid(&self.record_id)?,
      institution_id: self.institution_id,
      workflow: decode_workflow(&self.workflow)?,
      subject,
      status: decode_status(&self.status)?,
      events,
      scheduled_checkout: self
        .scheduled_checkout
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Directory rows ──────────────────────────────────────────────────────────

pub struct RawInstitution {
  pub institution_id:             String,
  pub identifier:                 String,
  pub name:                       String,
  pub workflow:                   String,
  pub require_checkout_screening: bool,
}

impl RawInstitution {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      institution_id:             row.get(0)?,
      identifier:                 row.get(1)?,
      name:                       row.get(2)?,
      workflow:                   row.get(3)?,
      require_checkout_screening: row.get(4)?,
    })
  }

  pub fn into_institution(self) -> Result<Institution> {
    Ok(Institution {
      institution_id:             self.institution_id,
      identifier:                 self.identifier,
      name:                       self.name,
      workflow:                   decode_workflow(&self.workflow)?,
      require_checkout_screening: self.require_checkout_screening,
    })
  }
}

/// `individuals` rows need no decoding beyond the optional family link.
pub fn individual_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Individual> {
  let family_id: Option<String> = row.get(7)?;
  let relation: Option<String> = row.get(8)?;
  Ok(Individual {
    individual_id:  row.get(0)?,
    institution_id: row.get(1)?,
    first_name:     row.get(2)?,
    last_name:      row.get(3)?,
    phone_num:      row.get(4)?,
    email:          row.get(5)?,
    group:          row.get(6)?,
    family:         family_id.map(|family_id| FamilyLink {
      family_id,
      relation: relation.unwrap_or_default(),
    }),
  })
}

pub fn dependent_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Dependent> {
  Ok(Dependent {
    dependent_id: row.get(0)?,
    first_name:   row.get(1)?,
    last_name:    row.get(2)?,
    group:        row.get(3)?,
  })
}

/// Raw `families` row; dependents are attached by the caller.
pub fn family_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Family> {
  Ok(Family {
    family_id:      row.get(0)?,
    institution_id: row.get(1)?,
    guardian_id:    row.get(2)?,
    dependents:     Vec::new(),
  })
}

pub struct RawTag {
  pub tag_id:         String,
  pub institution_id: String,
  pub tag_string:     String,
  pub created_at:     String,
}

impl RawTag {
  pub fn into_tag(self) -> Result<Tag> {
    Ok(Tag {
      tag_id:         decode_uuid(&self.tag_id)?,
      institution_id: self.institution_id,
      tag_string:     self.tag_string,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}
