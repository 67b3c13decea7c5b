//! [`ScanService`] — one scan in, record transitions out.
//!
//! | Payload | Subject | Stage |
//! |---------|---------|-------|
//! | individual | the individual | from the payload |
//! | dependent, single | one dependent of the guardian's family | from the payload |
//! | dependent, all | every dependent of the guardian's family | from the payload |
//! | tag | the tag, created on first sight | from the record status |
//!
//! A check-in scan creates the subject's record when none is active. Every
//! other scan needs an active record already in the status its transition
//! expects; otherwise the scan fails with [`Error::NotFound`] and nothing is
//! written.

use std::time::Duration;

use cc_core::{
  Error, Result,
  entity::{Dependent, Family, Individual, Institution},
  lifecycle::{ScanMode, StatusChange, Transition},
  payload::EventDescriptor,
  record::{
    CcRecord, FanOut, GuardianEvent, GuardianInfo, MemberTagEvent, NewRecord,
    ScanEvent, ScanReading, Stage, SubjectRef,
  },
  screening::{Screening, ScreeningPolicy},
  store::{
    Advanced, BatchAdvanced, Directory, PendingAdvance, RecordFilter,
    RecordQuery, RecordStore,
  },
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  bounded::bounded,
  config::ScanConfig,
  outcome::{RecordRef, ScanOutcome, SyncRequest},
  resolve::Resolver,
};

pub struct ScanService<S> {
  store:  S,
  config: ScanConfig,
}

impl<S> ScanService<S>
where
  S: RecordStore + Directory,
{
  pub fn new(store: S, config: ScanConfig) -> Self { Self { store, config } }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &ScanConfig { &self.config }

  fn timeout(&self) -> Duration { self.config.store_timeout() }

  fn resolver(&self) -> Resolver<'_, S> { Resolver::new(&self.store, self.timeout()) }

  fn policy(&self, institution: &Institution) -> ScreeningPolicy {
    self
      .config
      .screening()
      .for_institution(institution.require_checkout_screening)
  }

  // ─── Scans ──────────────────────────────────────────────────────────────

  /// Apply one scan. `raw` is the `|`-delimited payload; `reading` the
  /// measurements posted with it.
  pub async fn handle_scan(
    &self,
    raw: &str,
    reading: ScanReading,
  ) -> Result<ScanOutcome> {
    let descriptor = EventDescriptor::parse(raw, self.config.strictness)?;
    debug!(?descriptor, "parsed scan payload");
    // Event snapshots must round-trip through JSON.
    if !reading.temperature.is_finite() {
      return Err(Error::BadPayload(format!(
        "temperature is not a finite reading: {}",
        reading.temperature
      )));
    }

    let outcome = match descriptor {
      EventDescriptor::Individual { individual_id, stage, scanned_at } => {
        self
          .scan_individual(&individual_id, stage, scanned_at, reading)
          .await
      }
      EventDescriptor::Dependent {
        guardian_id,
        dependent_id,
        stage,
        fan_out,
        scanned_at,
      } => {
        self
          .scan_dependent(
            &guardian_id,
            &dependent_id,
            stage,
            fan_out,
            scanned_at,
            reading,
          )
          .await
      }
      // Tag scans are stamped with the time the service saw them.
      EventDescriptor::Tag { institution_identifier, tag_string, .. } => {
        self
          .scan_tag(&institution_identifier, &tag_string, reading)
          .await
      }
    };

    match &outcome {
      Ok(o) => info!(
        success = o.success,
        stage = %o.stage,
        records = o.records.len(),
        "scan applied"
      ),
      Err(e) => warn!(error = %e, "scan rejected"),
    }
    outcome
  }

  async fn scan_individual(
    &self,
    individual_id: &str,
    stage: Stage,
    scanned_at: DateTime<Utc>,
    reading: ScanReading,
  ) -> Result<ScanOutcome> {
    let resolver = self.resolver();
    let individual = resolver.individual(individual_id).await?;
    let institution = resolver.institution(&individual.institution_id).await?;

    let transition = Transition::for_stage(ScanMode::Individual, stage);
    let new = NewRecord::for_individual(&individual, institution.workflow);
    let record = self.locate(&institution, new, transition).await?;

    let screening = self.policy(&institution).screen(stage, &reading);
    let event = ScanEvent::MemberTag(MemberTagEvent { stage, reading, scanned_at });
    let record = self
      .advance(&record, transition, transition.with_event(screening.verdict, event))
      .await?;

    Ok(outcome(stage, screening, &[record]))
  }

  async fn scan_dependent(
    &self,
    guardian_id: &str,
    dependent_id: &str,
    stage: Stage,
    fan_out: FanOut,
    scanned_at: DateTime<Utc>,
    reading: ScanReading,
  ) -> Result<ScanOutcome> {
    let resolver = self.resolver();
    let guardian = resolver.individual(guardian_id).await?;
    let family = resolver.family_of_guardian(&guardian).await?;
    let institution = resolver.institution(&family.institution_id).await?;

    let targets: Vec<&Dependent> = match fan_out {
      FanOut::All => family.dependents.iter().collect(),
      FanOut::Single => {
        vec![family.dependent(dependent_id).ok_or_else(|| {
          Error::not_found(format!(
            "dependent {dependent_id} in family {}",
            family.family_id
          ))
        })?]
      }
    };
    if targets.is_empty() {
      return Err(Error::not_found(format!(
        "dependents of family {}",
        family.family_id
      )));
    }

    let transition = Transition::for_stage(ScanMode::Dependent, stage);

    // Check every dependent before creating or advancing anything.
    let mut found = Vec::with_capacity(targets.len());
    for dependent in &targets {
      let subject = SubjectRef::dependent(&dependent.dependent_id);
      let record = self
        .find_matching(&institution, &subject, transition)
        .await
        .map_err(|e| naming(&dependent.dependent_id, e))?;
      if record.is_none() && !creates(transition) {
        return Err(naming(&dependent.dependent_id, absent(&subject)));
      }
      found.push(record);
    }

    let screening = self.policy(&institution).screen(stage, &reading);
    let event = ScanEvent::Guardian(GuardianEvent {
      guardian: GuardianInfo::from(&guardian),
      fan_out,
      stage,
      reading,
      scanned_at,
    });

    let mut pending = Vec::with_capacity(targets.len());
    for (dependent, record) in targets.iter().zip(found) {
      let record = match record {
        Some(record) => record,
        None => {
          let new = NewRecord::for_dependent(&family, dependent, institution.workflow);
          self
            .create_matching(new, transition)
            .await
            .map_err(|e| naming(&dependent.dependent_id, e))?
        }
      };
      pending.push(PendingAdvance {
        record_id: record.record_id,
        expected:  transition.expected,
        change:    transition.with_event(screening.verdict, event.clone()),
      });
    }

    let records = self.advance_batch(pending).await?;
    Ok(outcome(stage, screening, &records))
  }

  async fn scan_tag(
    &self,
    institution_identifier: &str,
    tag_string: &str,
    reading: ScanReading,
  ) -> Result<ScanOutcome> {
    let resolver = self.resolver();
    let institution = resolver
      .institution_by_identifier(institution_identifier)
      .await?;
    let tag = resolver.tag(&institution, tag_string).await?;

    let new = NewRecord::for_tag(&tag, institution.workflow);
    let record = self.get_or_create(&institution, new).await?;

    let Some((stage, transition)) = Transition::for_tag(record.status) else {
      return Err(Error::not_found(format!(
        "record {} is {}; a tag scan cannot advance it",
        record.record_id, record.status
      )));
    };
    debug!(record_id = %record.record_id, %stage, "derived tag stage");

    let screening = self.policy(&institution).screen(stage, &reading);
    let event = ScanEvent::MemberTag(MemberTagEvent {
      stage,
      reading,
      scanned_at: Utc::now(),
    });
    let record = self
      .advance(&record, transition, transition.with_event(screening.verdict, event))
      .await?;

    Ok(outcome(stage, screening, &[record]))
  }

  // ─── Administration ─────────────────────────────────────────────────────

  /// Schedule the checkout of each dependent at `at`.
  ///
  /// Every dependent needs an active record in `CheckInComplete`. Either all
  /// of them move to `ScheduleComplete` or none does.
  pub async fn schedule_checkout(
    &self,
    dependent_ids: &[String],
    at: DateTime<Utc>,
  ) -> Result<Vec<RecordRef>> {
    if dependent_ids.is_empty() {
      return Err(Error::BadPayload("no dependents to schedule".into()));
    }

    let resolver = self.resolver();
    let transition = Transition::SCHEDULE;
    let mut seen: Vec<&str> = Vec::with_capacity(dependent_ids.len());
    let mut pending = Vec::with_capacity(dependent_ids.len());

    for id in dependent_ids {
      if seen.contains(&id.as_str()) {
        continue;
      }
      seen.push(id);

      let family = resolver.family_of_dependent(id).await?;
      let institution = resolver.institution(&family.institution_id).await?;
      let subject = SubjectRef::dependent(id);
      let record = self
        .find_matching(&institution, &subject, transition)
        .await
        .map_err(|e| naming(id, e))?
        .ok_or_else(|| naming(id, absent(&subject)))?;

      pending.push(PendingAdvance {
        record_id: record.record_id,
        expected:  transition.expected,
        change:    transition.with_schedule(at),
      });
    }

    let records = self.advance_batch(pending).await?;
    info!(records = records.len(), %at, "checkout scheduled");
    Ok(records.iter().map(RecordRef::from).collect())
  }

  /// Return the active record of each requested subject, creating the
  /// missing ones in `Init`.
  pub async fn sync_records(&self, request: &SyncRequest) -> Result<Vec<CcRecord>> {
    if request.individual_id.is_none() && request.dependent_ids.is_empty() {
      return Err(Error::BadPayload(
        "sync needs an individual or at least one dependent".into(),
      ));
    }

    let resolver = self.resolver();
    let institution = resolver.institution(&request.institution_id).await?;
    let mut records = Vec::new();

    if let Some(id) = &request.individual_id {
      let individual = resolver.individual(id).await?;
      if individual.institution_id != institution.institution_id {
        return Err(Error::not_found(format!(
          "individual {id} at institution {}",
          institution.institution_id
        )));
      }
      let new = NewRecord::for_individual(&individual, institution.workflow);
      records.push(self.get_or_create(&institution, new).await?);
    }

    for id in &request.dependent_ids {
      let family = resolver.family_of_dependent(id).await?;
      let dependent = family
        .dependent(id)
        .filter(|_| family.institution_id == institution.institution_id)
        .ok_or_else(|| {
          Error::not_found(format!(
            "dependent {id} at institution {}",
            institution.institution_id
          ))
        })?;
      let new = NewRecord::for_dependent(&family, dependent, institution.workflow);
      records.push(self.get_or_create(&institution, new).await?);
    }

    debug!(records = records.len(), "records synced");
    Ok(records)
  }

  pub async fn record(&self, record_id: Uuid) -> Result<CcRecord> {
    bounded(self.timeout(), "get_record", self.store.get_record(record_id))
      .await?
      .ok_or_else(|| Error::not_found(format!("record {record_id}")))
  }

  pub async fn records(&self, filter: &RecordFilter) -> Result<Vec<CcRecord>> {
    bounded(self.timeout(), "list_records", self.store.list_records(filter)).await
  }

  pub async fn delete_record(&self, record_id: Uuid) -> Result<()> {
    let deleted =
      bounded(self.timeout(), "delete_record", self.store.delete_record(record_id))
        .await?;
    if !deleted {
      return Err(Error::not_found(format!("record {record_id}")));
    }
    info!(%record_id, "record deleted");
    Ok(())
  }

  // ── Directory registration ──────────────────────────────────────────────

  pub async fn institution(&self, institution_id: &str) -> Result<Institution> {
    self.resolver().institution(institution_id).await
  }

  pub async fn add_institution(&self, institution: Institution) -> Result<Institution> {
    bounded(
      self.timeout(),
      "add_institution",
      self.store.add_institution(institution),
    )
    .await
  }

  pub async fn add_individual(&self, individual: Individual) -> Result<Individual> {
    bounded(self.timeout(), "add_individual", self.store.add_individual(individual))
      .await
  }

  pub async fn add_family(&self, family: Family) -> Result<Family> {
    bounded(self.timeout(), "add_family", self.store.add_family(family)).await
  }

  // ─── Record plumbing ────────────────────────────────────────────────────

  /// The subject's active record, if it is in the status `transition`
  /// expects. `Ok(None)` means there is no active record at all.
  async fn find_matching(
    &self,
    institution: &Institution,
    subject: &SubjectRef,
    transition: Transition,
  ) -> Result<Option<CcRecord>> {
    let query = RecordQuery::active(
      &institution.institution_id,
      subject.clone(),
      institution.workflow,
    );
    let found =
      bounded(self.timeout(), "find_active", self.store.find_active(query)).await?;

    match found {
      Some(record) if !transition.matches(record.status) => {
        Err(mismatch(&record, transition))
      }
      other => Ok(other),
    }
  }

  /// Create-if-absent, then require the expected status. A concurrent
  /// writer may have created and already advanced the record.
  async fn create_matching(
    &self,
    new: NewRecord,
    transition: Transition,
  ) -> Result<CcRecord> {
    let created =
      bounded(self.timeout(), "create_record", self.store.create_record(new)).await?;
    if created.was_inserted() {
      debug!("created record");
    }

    let record = created.into_record();
    if transition.matches(record.status) {
      Ok(record)
    } else {
      Err(mismatch(&record, transition))
    }
  }

  /// The record `transition` applies to, created on check-in.
  async fn locate(
    &self,
    institution: &Institution,
    new: NewRecord,
    transition: Transition,
  ) -> Result<CcRecord> {
    let subject = new.subject.subject_ref();
    match self.find_matching(institution, &subject, transition).await? {
      Some(record) => Ok(record),
      None if creates(transition) => self.create_matching(new, transition).await,
      None => Err(absent(&subject)),
    }
  }

  async fn get_or_create(
    &self,
    institution: &Institution,
    new: NewRecord,
  ) -> Result<CcRecord> {
    let query = RecordQuery::active(
      &institution.institution_id,
      new.subject.subject_ref(),
      institution.workflow,
    );
    let found =
      bounded(self.timeout(), "find_active", self.store.find_active(query)).await?;
    match found {
      Some(record) => Ok(record),
      None => Ok(
        bounded(self.timeout(), "create_record", self.store.create_record(new))
          .await?
          .into_record(),
      ),
    }
  }

  async fn advance(
    &self,
    record: &CcRecord,
    transition: Transition,
    change: StatusChange,
  ) -> Result<CcRecord> {
    let advanced = bounded(
      self.timeout(),
      "append_event_and_advance",
      self
        .store
        .append_event_and_advance(record.record_id, transition.expected, change),
    )
    .await?;

    match advanced {
      Advanced::Applied(record) => Ok(record),
      Advanced::Conflict { record_id } => {
        warn!(%record_id, "record changed concurrently");
        Err(Error::Conflict(record_id))
      }
    }
  }

  async fn advance_batch(&self, batch: Vec<PendingAdvance>) -> Result<Vec<CcRecord>> {
    let advanced =
      bounded(self.timeout(), "advance_all", self.store.advance_all(batch)).await?;

    match advanced {
      BatchAdvanced::Applied(records) => Ok(records),
      BatchAdvanced::Conflict { record_id } => {
        warn!(%record_id, "record changed concurrently; batch rolled back");
        Err(Error::Conflict(record_id))
      }
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Only check-in may bring a record into existence.
fn creates(transition: Transition) -> bool { transition == Transition::CHECK_IN }

fn absent(subject: &SubjectRef) -> Error {
  Error::not_found(format!("no active record for {} {}", subject.kind, subject.id))
}

fn mismatch(record: &CcRecord, transition: Transition) -> Error {
  Error::not_found(format!(
    "record {} is {}, not {}",
    record.record_id, record.status, transition.expected
  ))
}

/// Prefix a `NotFound` with the dependent it concerns.
fn naming(dependent_id: &str, err: Error) -> Error {
  match err {
    Error::NotFound(what) => {
      Error::NotFound(format!("dependent {dependent_id}: {what}"))
    }
    other => other,
  }
}

fn outcome(stage: Stage, screening: Screening, records: &[CcRecord]) -> ScanOutcome {
  ScanOutcome {
    success: screening.verdict.passed(),
    stage,
    screening,
    records: records.iter().map(RecordRef::from).collect(),
  }
}
