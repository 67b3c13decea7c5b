//! Integration tests for `SqliteStore` against an in-memory database.

use cc_core::{
  entity::{Dependent, Family, FamilyLink, Individual, Institution, WorkflowType},
  lifecycle::{StatusChange, Transition},
  record::{
    MemberTagEvent, NewRecord, ScanEvent, ScanReading, Stage, Status, SubjectRef,
  },
  screening::Verdict,
  store::{
    Advanced, BatchAdvanced, Created, Directory, PendingAdvance, RecordFilter,
    RecordQuery, RecordStore,
  },
};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn institution(workflow: WorkflowType) -> Institution {
  Institution {
    institution_id:             "inst-1".into(),
    identifier:                 "INST01".into(),
    name:                       "Maple Elementary".into(),
    workflow,
    require_checkout_screening: false,
  }
}

fn individual(id: &str) -> Individual {
  Individual {
    individual_id:  id.into(),
    institution_id: "inst-1".into(),
    first_name:     "Ada".into(),
    last_name:      "Byron".into(),
    phone_num:      Some("555-0100".into()),
    email:          None,
    group:          Some("staff".into()),
    family:         None,
  }
}

fn dependent(id: &str) -> Dependent {
  Dependent {
    dependent_id: id.into(),
    first_name:   "Kid".into(),
    last_name:    id.into(),
    group:        Some("2B".into()),
  }
}

fn family() -> Family {
  Family {
    family_id:      "fam-1".into(),
    institution_id: "inst-1".into(),
    guardian_id:    "guardian-1".into(),
    dependents:     vec![dependent("w1"), dependent("w2"), dependent("w3")],
  }
}

fn scan(stage: Stage, temperature: f32) -> ScanEvent {
  ScanEvent::MemberTag(MemberTagEvent {
    stage,
    reading: ScanReading { temperature, ..ScanReading::default() },
    scanned_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
  })
}

fn check_in(temperature: f32) -> StatusChange {
  Transition::CHECK_IN.with_event(Verdict::Pass, scan(Stage::CheckIn, temperature))
}

async fn seeded(workflow: WorkflowType) -> SqliteStore {
  let s = store().await;
  s.add_institution(institution(workflow)).await.unwrap();
  s
}

// ─── Directory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn institution_round_trip() {
  let s = seeded(WorkflowType::CheckInOnly).await;

  let by_id = s.get_institution("inst-1".into()).await.unwrap();
  assert_eq!(by_id, Some(institution(WorkflowType::CheckInOnly)));

  let by_identifier = s.institution_by_identifier("INST01".into()).await.unwrap();
  assert_eq!(by_identifier, by_id);

  assert!(s.get_institution("nope".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn individual_with_family_link_round_trip() {
  let s = seeded(WorkflowType::FullCycle).await;
  let mut guardian = individual("guardian-1");
  guardian.family = Some(FamilyLink {
    family_id: "fam-1".into(),
    relation:  "mother".into(),
  });
  s.add_individual(guardian.clone()).await.unwrap();

  let fetched = s.get_individual("guardian-1".into()).await.unwrap();
  assert_eq!(fetched, Some(guardian));
}

#[tokio::test]
async fn family_keeps_dependent_order() {
  let s = seeded(WorkflowType::FullCycle).await;
  s.add_family(family()).await.unwrap();

  let fetched = s.get_family("fam-1".into()).await.unwrap().unwrap();
  let ids: Vec<_> = fetched.dependents.iter().map(|d| d.dependent_id.as_str()).collect();
  assert_eq!(ids, ["w1", "w2", "w3"]);

  let via_dependent = s.family_of_dependent("w2".into()).await.unwrap();
  assert_eq!(via_dependent, Some(fetched));
  assert!(s.family_of_dependent("w9".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn tag_is_created_once() {
  let s = seeded(WorkflowType::FullCycle).await;

  let first = s.get_or_create_tag("inst-1".into(), "tagXYZ".into()).await.unwrap();
  let again = s.get_or_create_tag("inst-1".into(), "tagXYZ".into()).await.unwrap();
  assert_eq!(first, again);

  let other = s.get_or_create_tag("inst-1".into(), "tagABC".into()).await.unwrap();
  assert_ne!(first.tag_id, other.tag_id);
}

// ─── Record creation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_starts_in_init_without_events() {
  let s = seeded(WorkflowType::FullCycle).await;
  let created = s
    .create_record(NewRecord::for_individual(&individual("m1"), WorkflowType::FullCycle))
    .await
    .unwrap();

  assert!(created.was_inserted());
  let record = created.into_record();
  assert_eq!(record.status, Status::Init);
  assert!(record.events.is_empty());

  let fetched = s.get_record(record.record_id).await.unwrap();
  assert_eq!(fetched, Some(record));
}

#[tokio::test]
async fn second_create_returns_the_active_record() {
  let s = seeded(WorkflowType::FullCycle).await;
  let input = NewRecord::for_individual(&individual("m1"), WorkflowType::FullCycle);

  let first = s.create_record(input.clone()).await.unwrap().into_record();
  let second = s.create_record(input).await.unwrap();

  let Created::Existing(existing) = second else {
    panic!("expected the existing record")
  };
  assert_eq!(existing.record_id, first.record_id);
  assert_eq!(s.list_records(&RecordFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_creates_yield_one_active_record() {
  let s = seeded(WorkflowType::FullCycle).await;
  let input = NewRecord::for_individual(&individual("m1"), WorkflowType::FullCycle);

  let handles: Vec<_> = (0..8)
    .map(|_| {
      let s = s.clone();
      let input = input.clone();
      tokio::spawn(async move { s.create_record(input).await.unwrap() })
    })
    .collect();

  let mut ids = Vec::new();
  let mut inserted = 0;
  for h in handles {
    let created = h.await.unwrap();
    if created.was_inserted() {
      inserted += 1;
    }
    ids.push(created.into_record().record_id);
  }

  assert_eq!(inserted, 1);
  ids.dedup();
  assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn terminal_record_frees_the_subject() {
  let s = seeded(WorkflowType::CheckInOnly).await;
  let input = NewRecord::for_individual(&individual("m1"), WorkflowType::CheckInOnly);

  let first = s.create_record(input.clone()).await.unwrap().into_record();
  s.append_event_and_advance(first.record_id, Status::Init, check_in(97.0))
    .await
    .unwrap();

  // CheckInComplete is closed under check-in-only, so a new cycle may start.
  let second = s.create_record(input).await.unwrap();
  assert!(second.was_inserted());
  assert_ne!(second.into_record().record_id, first.record_id);
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn find_active_honours_workflow_exclusions() {
  let s = seeded(WorkflowType::FullCycle).await;
  let record = s
    .create_record(NewRecord::for_individual(&individual("m1"), WorkflowType::FullCycle))
    .await
    .unwrap()
    .into_record();

  let query =
    RecordQuery::active("inst-1", SubjectRef::individual("m1"), WorkflowType::FullCycle);
  let found = s.find_active(query.clone()).await.unwrap().unwrap();
  assert_eq!(found.record_id, record.record_id);

  s.append_event_and_advance(record.record_id, Status::Init, check_in(97.0))
    .await
    .unwrap();
  s.append_event_and_advance(
    record.record_id,
    Status::CheckInComplete,
    Transition::CHECK_OUT_AFTER_CHECK_IN
      .with_event(Verdict::Pass, scan(Stage::CheckOut, 97.0)),
  )
  .await
  .unwrap();

  assert!(s.find_active(query).await.unwrap().is_none());
}

#[tokio::test]
async fn find_active_is_scoped_by_subject_kind() {
  let s = seeded(WorkflowType::FullCycle).await;
  s.create_record(NewRecord::for_individual(&individual("x"), WorkflowType::FullCycle))
    .await
    .unwrap();

  let query =
    RecordQuery::active("inst-1", SubjectRef::dependent("x"), WorkflowType::FullCycle);
  assert!(s.find_active(query).await.unwrap().is_none());
}

// ─── Compare-and-swap ────────────────────────────────────────────────────────

#[tokio::test]
async fn advance_appends_event_and_moves_status() {
  let s = seeded(WorkflowType::FullCycle).await;
  let record = s
    .create_record(NewRecord::for_individual(&individual("m1"), WorkflowType::FullCycle))
    .await
    .unwrap()
    .into_record();

  let Advanced::Applied(updated) = s
    .append_event_and_advance(record.record_id, Status::Init, check_in(97.5))
    .await
    .unwrap()
  else {
    panic!("expected the advance to apply")
  };

  assert_eq!(updated.status, Status::CheckInComplete);
  assert_eq!(updated.events.len(), 1);
  assert_eq!(updated.events[0].reading().temperature, 97.5);
}

#[tokio::test]
async fn stale_expected_status_is_a_conflict() {
  let s = seeded(WorkflowType::FullCycle).await;
  let record = s
    .create_record(NewRecord::for_individual(&individual("m1"), WorkflowType::FullCycle))
    .await
    .unwrap()
    .into_record();

  s.append_event_and_advance(record.record_id, Status::Init, check_in(97.0))
    .await
    .unwrap();
  let again = s
    .append_event_and_advance(record.record_id, Status::Init, check_in(98.0))
    .await
    .unwrap();

  assert_eq!(again, Advanced::Conflict { record_id: record.record_id });
  let stored = s.get_record(record.record_id).await.unwrap().unwrap();
  assert_eq!(stored.events.len(), 1, "conflicting event must not be appended");
}

#[tokio::test]
async fn racing_advances_apply_once() {
  let s = seeded(WorkflowType::FullCycle).await;
  let record = s
    .create_record(NewRecord::for_individual(&individual("m1"), WorkflowType::FullCycle))
    .await
    .unwrap()
    .into_record();

  let handles: Vec<_> = (0..6)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move {
        s.append_event_and_advance(record.record_id, Status::Init, check_in(96.0 + i as f32))
          .await
          .unwrap()
      })
    })
    .collect();

  let mut applied = 0;
  for h in handles {
    if matches!(h.await.unwrap(), Advanced::Applied(_)) {
      applied += 1;
    }
  }
  assert_eq!(applied, 1);

  let stored = s.get_record(record.record_id).await.unwrap().unwrap();
  assert_eq!(stored.events.len(), 1);
}

#[tokio::test]
async fn schedule_sets_checkout_time_without_event() {
  let s = seeded(WorkflowType::FullCycle).await;
  let record = s
    .create_record(NewRecord::for_individual(&individual("m1"), WorkflowType::FullCycle))
    .await
    .unwrap()
    .into_record();
  s.append_event_and_advance(record.record_id, Status::Init, check_in(97.0))
    .await
    .unwrap();

  let at = DateTime::from_timestamp(1_700_010_000, 0).unwrap();
  let Advanced::Applied(updated) = s
    .append_event_and_advance(
      record.record_id,
      Status::CheckInComplete,
      Transition::SCHEDULE.with_schedule(at),
    )
    .await
    .unwrap()
  else {
    panic!("expected the schedule to apply")
  };

  assert_eq!(updated.status, Status::ScheduleComplete);
  assert_eq!(updated.scheduled_checkout, Some(at));
  assert_eq!(updated.events.len(), 1);
}

#[tokio::test]
async fn batch_rolls_back_on_any_conflict() {
  let s = seeded(WorkflowType::FullCycle).await;
  let fam = family();
  s.add_family(fam.clone()).await.unwrap();

  let mut ids = Vec::new();
  for d in &fam.dependents {
    let r = s
      .create_record(NewRecord::for_dependent(&fam, d, WorkflowType::FullCycle))
      .await
      .unwrap()
      .into_record();
    ids.push(r.record_id);
  }
  // Move the last one ahead so its expected status no longer matches.
  s.append_event_and_advance(ids[2], Status::Init, check_in(97.0))
    .await
    .unwrap();

  let batch = ids
    .iter()
    .map(|&record_id| PendingAdvance {
      record_id,
      expected: Status::Init,
      change: check_in(97.0),
    })
    .collect();
  let outcome = s.advance_all(batch).await.unwrap();
  assert_eq!(outcome, BatchAdvanced::Conflict { record_id: ids[2] });

  for id in &ids[..2] {
    let r = s.get_record(*id).await.unwrap().unwrap();
    assert_eq!(r.status, Status::Init, "batch must not partially apply");
    assert!(r.events.is_empty());
  }
}

#[tokio::test]
async fn batch_applies_in_input_order() {
  let s = seeded(WorkflowType::FullCycle).await;
  let fam = family();
  let mut ids = Vec::new();
  for d in &fam.dependents {
    let r = s
      .create_record(NewRecord::for_dependent(&fam, d, WorkflowType::FullCycle))
      .await
      .unwrap()
      .into_record();
    ids.push(r.record_id);
  }

  let batch = ids
    .iter()
    .map(|&record_id| PendingAdvance {
      record_id,
      expected: Status::Init,
      change: check_in(97.0),
    })
    .collect();
  let BatchAdvanced::Applied(records) = s.advance_all(batch).await.unwrap() else {
    panic!("expected the batch to apply")
  };

  let applied: Vec<_> = records.iter().map(|r| r.record_id).collect();
  assert_eq!(applied, ids);
  assert!(records.iter().all(|r| r.status == Status::CheckInComplete));
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
  let s = store().await;
  let outcome = s.advance_all(Vec::new()).await.unwrap();
  assert_eq!(outcome, BatchAdvanced::Applied(Vec::new()));
}

// ─── Administration ──────────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_by_status_and_temperature() {
  let s = seeded(WorkflowType::FullCycle).await;
  for (id, temp) in [("m1", 97.0), ("m2", 100.4), ("m3", 98.0)] {
    let r = s
      .create_record(NewRecord::for_individual(&individual(id), WorkflowType::FullCycle))
      .await
      .unwrap()
      .into_record();
    if id != "m3" {
      s.append_event_and_advance(r.record_id, Status::Init, check_in(temp))
        .await
        .unwrap();
    }
  }

  let checked_in = s
    .list_records(&RecordFilter {
      status: Some(Status::CheckInComplete),
      ..RecordFilter::default()
    })
    .await
    .unwrap();
  assert_eq!(checked_in.len(), 2);

  let hot = s
    .list_records(&RecordFilter {
      min_temperature: Some(99.0),
      ..RecordFilter::default()
    })
    .await
    .unwrap();
  assert_eq!(hot.len(), 1);
  assert_eq!(hot[0].subject.subject_ref(), SubjectRef::individual("m2"));

  let one_subject = s
    .list_records(&RecordFilter {
      subject_id: Some("m3".into()),
      ..RecordFilter::default()
    })
    .await
    .unwrap();
  assert_eq!(one_subject.len(), 1);
  assert_eq!(one_subject[0].status, Status::Init);
}

#[tokio::test]
async fn list_pages_newest_first() {
  let s = seeded(WorkflowType::FullCycle).await;
  for id in ["m1", "m2", "m3", "m4"] {
    s.create_record(NewRecord::for_individual(&individual(id), WorkflowType::FullCycle))
      .await
      .unwrap();
  }

  let page = s
    .list_records(&RecordFilter {
      limit: Some(2),
      offset: Some(1),
      ..RecordFilter::default()
    })
    .await
    .unwrap();
  assert_eq!(page.len(), 2);

  let future = s
    .list_records(&RecordFilter {
      created_after: Some(Utc::now() + Duration::hours(1)),
      ..RecordFilter::default()
    })
    .await
    .unwrap();
  assert!(future.is_empty());
}

#[tokio::test]
async fn delete_removes_record_and_events() {
  let s = seeded(WorkflowType::FullCycle).await;
  let record = s
    .create_record(NewRecord::for_individual(&individual("m1"), WorkflowType::FullCycle))
    .await
    .unwrap()
    .into_record();
  s.append_event_and_advance(record.record_id, Status::Init, check_in(97.0))
    .await
    .unwrap();

  assert!(s.delete_record(record.record_id).await.unwrap());
  assert!(s.get_record(record.record_id).await.unwrap().is_none());
  assert!(!s.delete_record(record.record_id).await.unwrap());
  assert!(!s.delete_record(Uuid::new_v4()).await.unwrap());
}
