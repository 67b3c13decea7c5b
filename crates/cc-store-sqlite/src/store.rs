//! [`SqliteStore`] — the SQLite implementation of [`RecordStore`] and
//! [`Directory`].
//!
//! All access goes through one `tokio_rusqlite` connection, so every
//! `call` closure runs to completion before the next one starts. The
//! compare-and-swap advances additionally run inside a transaction so a
//! batch is all-or-nothing.

use std::path::Path;

use cc_core::{
  entity::{Family, Individual, Institution, Tag, WorkflowType},
  lifecycle::StatusChange,
  record::{CcRecord, NewRecord, Status},
  store::{
    Advanced, BatchAdvanced, Created, Directory, PendingAdvance, RecordFilter,
    RecordQuery, RecordStore, StatusFilter,
  },
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RECORD_COLUMNS, RawInstitution, RawRecord, RawTag, decode_uuid,
    dependent_from_row, encode_dt, encode_status, encode_uuid,
    encode_workflow, family_from_row, individual_from_row,
  },
  schema::SCHEMA,
};

const INSTITUTION_COLUMNS: &str =
  "institution_id, identifier, name, workflow, require_checkout_screening";

const INDIVIDUAL_COLUMNS: &str = "individual_id, institution_id, first_name, \
                                  last_name, phone_num, email, grp, \
                                  family_id, relation";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A record store and directory backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_institution(
    &self,
    column: &'static str,
    value: String,
  ) -> Result<Option<Institution>> {
    let raw: Option<RawInstitution> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {INSTITUTION_COLUMNS} FROM institutions WHERE {column} = ?1"
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![value], RawInstitution::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawInstitution::into_institution).transpose()
  }
}

// ─── Row helpers (run inside `call` closures) ────────────────────────────────

fn load_events(
  conn: &rusqlite::Connection,
  record_id: &str,
) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare_cached(
    "SELECT event_json FROM scan_events WHERE record_id = ?1 ORDER BY seq",
  )?;
  let events = stmt
    .query_map(rusqlite::params![record_id], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(events)
}

fn load_record(
  conn: &rusqlite::Connection,
  record_id: &str,
) -> rusqlite::Result<Option<RawRecord>> {
  let sql = format!("SELECT {RECORD_COLUMNS} FROM cc_records WHERE record_id = ?1");
  let raw = conn
    .query_row(&sql, rusqlite::params![record_id], RawRecord::from_row)
    .optional()?;
  match raw {
    Some(mut raw) => {
      raw.events = load_events(conn, record_id)?;
      Ok(Some(raw))
    }
    None => Ok(None),
  }
}

fn query_records(
  conn: &rusqlite::Connection,
  sql: &str,
  params: &[String],
) -> rusqlite::Result<Vec<RawRecord>> {
  let mut stmt = conn.prepare(sql)?;
  let mut raws = stmt
    .query_map(rusqlite::params_from_iter(params.iter()), RawRecord::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  for raw in &mut raws {
    raw.events = load_events(conn, &raw.record_id)?;
  }
  Ok(raws)
}

fn load_family(
  conn: &rusqlite::Connection,
  family_id: &str,
) -> rusqlite::Result<Option<Family>> {
  let family = conn
    .query_row(
      "SELECT family_id, institution_id, guardian_id FROM families WHERE family_id = ?1",
      rusqlite::params![family_id],
      family_from_row,
    )
    .optional()?;
  let Some(mut family) = family else {
    return Ok(None);
  };

  let mut stmt = conn.prepare_cached(
    "SELECT dependent_id, first_name, last_name, grp FROM dependents
     WHERE family_id = ?1 ORDER BY position",
  )?;
  family.dependents = stmt
    .query_map(rusqlite::params![family_id], dependent_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(Some(family))
}

// ─── Compare-and-swap ────────────────────────────────────────────────────────

/// A [`PendingAdvance`] flattened to column values.
struct EncodedAdvance {
  record_id:            String,
  expected:             &'static str,
  status:               &'static str,
  active_full_cycle:    bool,
  active_check_in_only: bool,
  scheduled_checkout:   Option<String>,
  event_json:           Option<String>,
  recorded_at:          String,
}

impl EncodedAdvance {
  fn new(record_id: Uuid, expected: Status, change: &StatusChange) -> Result<Self> {
    Ok(Self {
      record_id:            encode_uuid(record_id),
      expected:             encode_status(expected),
      status:               encode_status(change.status),
      active_full_cycle:    WorkflowType::FullCycle.is_active(change.status),
      active_check_in_only: WorkflowType::CheckInOnly.is_active(change.status),
      scheduled_checkout:   change.scheduled_checkout.map(encode_dt),
      event_json:           change
        .event
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?,
      recorded_at:          encode_dt(Utc::now()),
    })
  }
}

/// Apply one advance. Returns `false`, having written nothing, when the
/// record is not in its expected status.
fn apply_advance(
  conn: &rusqlite::Connection,
  adv: &EncodedAdvance,
) -> rusqlite::Result<bool> {
  let changed = conn.execute(
    "UPDATE cc_records
        SET status = ?1,
            active = CASE workflow WHEN ?2 THEN ?3 ELSE ?4 END,
            scheduled_checkout = COALESCE(?5, scheduled_checkout)
      WHERE record_id = ?6 AND status = ?7",
    rusqlite::params![
      adv.status,
      encode_workflow(WorkflowType::CheckInOnly),
      adv.active_check_in_only,
      adv.active_full_cycle,
      adv.scheduled_checkout,
      adv.record_id,
      adv.expected,
    ],
  )?;
  if changed == 0 {
    return Ok(false);
  }

  if let Some(event_json) = &adv.event_json {
    conn.execute(
      "INSERT INTO scan_events (record_id, seq, event_json, recorded_at)
       VALUES (?1, (SELECT COUNT(*) FROM scan_events WHERE record_id = ?1), ?2, ?3)",
      rusqlite::params![adv.record_id, event_json, adv.recorded_at],
    )?;
  }
  Ok(true)
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  // ── Scan path ─────────────────────────────────────────────────────────────

  async fn find_active(&self, query: RecordQuery) -> Result<Option<CcRecord>> {
    let kind: &'static str = query.subject.kind.into();
    let mut sql = format!(
      "SELECT {RECORD_COLUMNS} FROM cc_records
       WHERE institution_id = ? AND subject_kind = ? AND subject_id = ?"
    );
    let mut params = vec![query.institution_id, kind.to_owned(), query.subject.id];

    if let StatusFilter::Exactly(status) = query.status {
      sql.push_str(" AND status = ?");
      params.push(encode_status(status).to_owned());
    }
    if !query.exclude.is_empty() {
      let marks = vec!["?"; query.exclude.len()].join(", ");
      sql.push_str(&format!(" AND status NOT IN ({marks})"));
      params.extend(query.exclude.iter().map(|s| encode_status(*s).to_owned()));
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT 1");

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| Ok(query_records(conn, &sql, &params)?))
      .await?;

    raws.into_iter().next().map(RawRecord::into_record).transpose()
  }

  async fn create_record(&self, input: NewRecord) -> Result<Created> {
    let record = CcRecord {
      record_id:          Uuid::new_v4(),
      institution_id:     input.institution_id,
      workflow:           input.workflow,
      subject:            input.subject,
      status:             Status::Init,
      events:             Vec::new(),
      scheduled_checkout: None,
      created_at:         Utc::now(),
    };

    let subject        = record.subject.subject_ref();
    let kind: &'static str = subject.kind.into();
    let subject_id     = subject.id;
    let id_str         = encode_uuid(record.record_id);
    let inst_str       = record.institution_id.clone();
    let workflow_str   = encode_workflow(record.workflow);
    let subject_json   = serde_json::to_string(&record.subject)?;
    let status_str     = encode_status(record.status);
    let active         = record.is_active();
    let created_str    = encode_dt(record.created_at);

    let existing: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT INTO cc_records (
             record_id, institution_id, workflow, subject_kind, subject_id,
             subject_json, status, active, scheduled_checkout, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)",
          rusqlite::params![
            id_str,
            inst_str,
            workflow_str,
            kind,
            subject_id,
            subject_json,
            status_str,
            active,
            created_str,
          ],
        );

        match inserted {
          Ok(_) => Ok(None),
          // The partial unique index rejected a second active record.
          Err(rusqlite::Error::SqliteFailure(e, msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            let sql = format!(
              "SELECT {RECORD_COLUMNS} FROM cc_records
               WHERE institution_id = ?1 AND subject_kind = ?2
                 AND subject_id = ?3 AND active = 1"
            );
            let raw = conn
              .query_row(
                &sql,
                rusqlite::params![inst_str, kind, subject_id],
                RawRecord::from_row,
              )
              .optional()?;
            match raw {
              Some(mut raw) => {
                raw.events = load_events(conn, &raw.record_id)?;
                Ok(Some(raw))
              }
              None => Err(rusqlite::Error::SqliteFailure(e, msg).into()),
            }
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    match existing {
      None => Ok(Created::Inserted(record)),
      Some(raw) => Ok(Created::Existing(raw.into_record()?)),
    }
  }

  async fn append_event_and_advance(
    &self,
    record_id: Uuid,
    expected:  Status,
    change:    StatusChange,
  ) -> Result<Advanced> {
    let batch = vec![PendingAdvance { record_id, expected, change }];
    match self.advance_all(batch).await? {
      BatchAdvanced::Applied(mut records) => records
        .pop()
        .map(Advanced::Applied)
        .ok_or(Error::RecordNotFound(record_id)),
      BatchAdvanced::Conflict { record_id } => Ok(Advanced::Conflict { record_id }),
    }
  }

  async fn advance_all(&self, batch: Vec<PendingAdvance>) -> Result<BatchAdvanced> {
    if batch.is_empty() {
      return Ok(BatchAdvanced::Applied(Vec::new()));
    }

    let encoded = batch
      .iter()
      .map(|p| EncodedAdvance::new(p.record_id, p.expected, &p.change))
      .collect::<Result<Vec<_>>>()?;

    let outcome: std::result::Result<Vec<RawRecord>, String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for adv in &encoded {
          if !apply_advance(&tx, adv)? {
            // Dropping `tx` rolls back everything applied so far.
            return Ok(Err(adv.record_id.clone()));
          }
        }
        tx.commit()?;

        let mut raws = Vec::with_capacity(encoded.len());
        for adv in &encoded {
          if let Some(raw) = load_record(conn, &adv.record_id)? {
            raws.push(raw);
          }
        }
        Ok(Ok(raws))
      })
      .await?;

    match outcome {
      Ok(raws) => Ok(BatchAdvanced::Applied(
        raws
          .into_iter()
          .map(RawRecord::into_record)
          .collect::<Result<_>>()?,
      )),
      Err(id) => Ok(BatchAdvanced::Conflict { record_id: decode_uuid(&id)? }),
    }
  }

  // ── Administration ────────────────────────────────────────────────────────

  async fn get_record(&self, record_id: Uuid) -> Result<Option<CcRecord>> {
    let id_str = encode_uuid(record_id);
    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| Ok(load_record(conn, &id_str)?))
      .await?;
    raw.map(RawRecord::into_record).transpose()
  }

  async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<CcRecord>> {
    let mut conds: Vec<String> = vec![];
    let mut params: Vec<String> = vec![];

    if let Some(inst) = &filter.institution_id {
      conds.push("institution_id = ?".into());
      params.push(inst.clone());
    }
    if let Some(subject_id) = &filter.subject_id {
      conds.push("subject_id = ?".into());
      params.push(subject_id.clone());
    }
    if let Some(status) = filter.status {
      conds.push("status = ?".into());
      params.push(encode_status(status).to_owned());
    }
    if !filter.exclude.is_empty() {
      let marks = vec!["?"; filter.exclude.len()].join(", ");
      conds.push(format!("status NOT IN ({marks})"));
      params.extend(filter.exclude.iter().map(|s| encode_status(*s).to_owned()));
    }
    if let Some(after) = filter.created_after {
      conds.push("created_at >= ?".into());
      params.push(encode_dt(after));
    }
    if let Some(before) = filter.created_before {
      conds.push("created_at <= ?".into());
      params.push(encode_dt(before));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let sql = format!(
      "SELECT {RECORD_COLUMNS} FROM cc_records {where_clause}
       ORDER BY created_at DESC, rowid DESC"
    );

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| Ok(query_records(conn, &sql, &params)?))
      .await?;

    let records = raws
      .into_iter()
      .map(RawRecord::into_record)
      .collect::<Result<Vec<_>>>()?;

    // Temperatures live inside the event JSON, so this filter runs here.
    Ok(
      records
        .into_iter()
        .filter(|r| match filter.min_temperature {
          Some(min) => r.events.iter().any(|e| e.reading().temperature >= min),
          None => true,
        })
        .skip(filter.offset.unwrap_or(0))
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect(),
    )
  }

  async fn delete_record(&self, record_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(record_id);
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM scan_events WHERE record_id = ?1",
          rusqlite::params![id_str],
        )?;
        let n = tx.execute(
          "DELETE FROM cc_records WHERE record_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.commit()?;
        Ok(n > 0)
      })
      .await?;
    Ok(deleted)
  }
}

// ─── Directory impl ──────────────────────────────────────────────────────────

impl Directory for SqliteStore {
  type Error = Error;

  // ── Lookups ───────────────────────────────────────────────────────────────

  async fn get_institution(&self, institution_id: String) -> Result<Option<Institution>> {
    self.query_institution("institution_id", institution_id).await
  }

  async fn institution_by_identifier(
    &self,
    identifier: String,
  ) -> Result<Option<Institution>> {
    self.query_institution("identifier", identifier).await
  }

  async fn get_individual(&self, individual_id: String) -> Result<Option<Individual>> {
    let individual = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {INDIVIDUAL_COLUMNS} FROM individuals WHERE individual_id = ?1"
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![individual_id], individual_from_row)
            .optional()?,
        )
      })
      .await?;
    Ok(individual)
  }

  async fn get_family(&self, family_id: String) -> Result<Option<Family>> {
    let family = self
      .conn
      .call(move |conn| Ok(load_family(conn, &family_id)?))
      .await?;
    Ok(family)
  }

  async fn family_of_dependent(&self, dependent_id: String) -> Result<Option<Family>> {
    let family = self
      .conn
      .call(move |conn| {
        let family_id: Option<String> = conn
          .query_row(
            "SELECT family_id FROM dependents WHERE dependent_id = ?1",
            rusqlite::params![dependent_id],
            |row| row.get(0),
          )
          .optional()?;
        match family_id {
          Some(id) => Ok(load_family(conn, &id)?),
          None => Ok(None),
        }
      })
      .await?;
    Ok(family)
  }

  async fn get_or_create_tag(
    &self,
    institution_id: String,
    tag_string:     String,
  ) -> Result<Tag> {
    let tag_id_str = encode_uuid(Uuid::new_v4());
    let at_str     = encode_dt(Utc::now());

    let raw: RawTag = self
      .conn
      .call(move |conn| {
        // (institution_id, tag_string) is the natural key; a concurrent first
        // sighting simply loses the insert and reads the winner's row.
        conn.execute(
          "INSERT OR IGNORE INTO tags (tag_id, institution_id, tag_string, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![tag_id_str, institution_id, tag_string, at_str],
        )?;
        Ok(conn.query_row(
          "SELECT tag_id, institution_id, tag_string, created_at FROM tags
           WHERE institution_id = ?1 AND tag_string = ?2",
          rusqlite::params![institution_id, tag_string],
          |row| {
            Ok(RawTag {
              tag_id:         row.get(0)?,
              institution_id: row.get(1)?,
              tag_string:     row.get(2)?,
              created_at:     row.get(3)?,
            })
          },
        )?)
      })
      .await?;

    raw.into_tag()
  }

  // ── Registration ──────────────────────────────────────────────────────────

  async fn add_institution(&self, institution: Institution) -> Result<Institution> {
    let id_str       = institution.institution_id.clone();
    let identifier   = institution.identifier.clone();
    let name         = institution.name.clone();
    let workflow_str = encode_workflow(institution.workflow);
    let require      = institution.require_checkout_screening;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO institutions (
             institution_id, identifier, name, workflow, require_checkout_screening
           ) VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, identifier, name, workflow_str, require],
        )?;
        Ok(())
      })
      .await?;

    Ok(institution)
  }

  async fn add_individual(&self, individual: Individual) -> Result<Individual> {
    let row = individual.clone();

    self
      .conn
      .call(move |conn| {
        let (family_id, relation) = match row.family {
          Some(link) => (Some(link.family_id), Some(link.relation)),
          None => (None, None),
        };
        conn.execute(
          "INSERT INTO individuals (
             individual_id, institution_id, first_name, last_name,
             phone_num, email, grp, family_id, relation
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            row.individual_id,
            row.institution_id,
            row.first_name,
            row.last_name,
            row.phone_num,
            row.email,
            row.group,
            family_id,
            relation,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(individual)
  }

  async fn add_family(&self, family: Family) -> Result<Family> {
    let row = family.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO families (family_id, institution_id, guardian_id)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![row.family_id, row.institution_id, row.guardian_id],
        )?;
        for (position, d) in row.dependents.iter().enumerate() {
          tx.execute(
            "INSERT INTO dependents (
               dependent_id, family_id, position, first_name, last_name, grp
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
              d.dependent_id,
              row.family_id,
              position as i64,
              d.first_name,
              d.last_name,
              d.group,
            ],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(family)
  }
}
