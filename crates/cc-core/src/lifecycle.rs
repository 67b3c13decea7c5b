//! The record status state machine.
//!
//! Every change to a record is a [`Transition`]: the status the record must
//! currently be in, and the status it moves to. A backend applies it with a
//! compare-and-swap on the expected status, so two scanners racing on the
//! same record can never both advance it.
//!
//! | Scan | Expected | Target |
//! |------|----------|--------|
//! | check-in (individual, dependent, tag) | `Init` | `CheckInComplete` |
//! | dependent checkout | `ScheduleComplete` | `CheckOutComplete` |
//! | individual / tag checkout | `CheckInComplete` | `CheckOutComplete` |
//! | schedule request | `CheckInComplete` | `ScheduleComplete` |
//! | any of the above, screening failed | expected | `Failed` |

use chrono::{DateTime, Utc};

use crate::{
  record::{ScanEvent, Stage, Status},
  screening::Verdict,
};

/// Statuses reachable in one step from `from`.
pub fn allowed_transitions(from: Status) -> &'static [Status] {
  use Status::*;
  match from {
    Init => &[CheckInComplete, Failed],
    CheckInComplete => &[ScheduleComplete, CheckOutComplete, Failed],
    ScheduleComplete => &[CheckOutComplete, Failed],
    CheckOutComplete => &[],
    Failed => &[],
  }
}

pub fn is_allowed(from: Status, to: Status) -> bool {
  allowed_transitions(from).contains(&to)
}

/// How a scan identified its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
  Individual,
  Dependent,
  Tag,
}

// ─── Transition ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub expected: Status,
  pub target:   Status,
}

impl Transition {
  pub const CHECK_IN: Self = Self {
    expected: Status::Init,
    target:   Status::CheckInComplete,
  };
  pub const CHECK_OUT_AFTER_CHECK_IN: Self = Self {
    expected: Status::CheckInComplete,
    target:   Status::CheckOutComplete,
  };
  pub const CHECK_OUT_AFTER_SCHEDULE: Self = Self {
    expected: Status::ScheduleComplete,
    target:   Status::CheckOutComplete,
  };
  pub const SCHEDULE: Self = Self {
    expected: Status::CheckInComplete,
    target:   Status::ScheduleComplete,
  };

  /// The transition a scan with an explicit stage asks for.
  ///
  /// Dependents are checked out from a scheduled pickup; everyone else
  /// straight from check-in.
  pub fn for_stage(mode: ScanMode, stage: Stage) -> Self {
    match (stage, mode) {
      (Stage::CheckIn, _) => Self::CHECK_IN,
      (Stage::CheckOut, ScanMode::Dependent) => Self::CHECK_OUT_AFTER_SCHEDULE,
      (Stage::CheckOut, ScanMode::Individual | ScanMode::Tag) => {
        Self::CHECK_OUT_AFTER_CHECK_IN
      }
    }
  }

  /// Derive stage and transition for a tag scan from the active record's
  /// status. A freshly created record is `Init`. Returns `None` for statuses
  /// a tag cannot advance from.
  pub fn for_tag(current: Status) -> Option<(Stage, Self)> {
    match current {
      Status::Init => Some((Stage::CheckIn, Self::CHECK_IN)),
      Status::CheckInComplete => {
        Some((Stage::CheckOut, Self::CHECK_OUT_AFTER_CHECK_IN))
      }
      _ => None,
    }
  }

  pub fn matches(&self, current: Status) -> bool { current == self.expected }

  /// Status the record ends in once screening has been decided. A failed
  /// screening overrides the normal target.
  pub fn resolve(&self, verdict: Verdict) -> Status {
    match verdict {
      Verdict::Pass => self.target,
      Verdict::Fail => Status::Failed,
    }
  }

  /// Build the change for a scan.
  pub fn with_event(&self, verdict: Verdict, event: ScanEvent) -> StatusChange {
    StatusChange {
      status:             self.resolve(verdict),
      event:              Some(event),
      scheduled_checkout: None,
    }
  }

  /// Build the change for a checkout schedule request. No event is attached.
  pub fn with_schedule(&self, at: DateTime<Utc>) -> StatusChange {
    StatusChange {
      status:             self.target,
      event:              None,
      scheduled_checkout: Some(at),
    }
  }
}

// ─── StatusChange ────────────────────────────────────────────────────────────

/// What a compare-and-swap advance writes once the expected status matched.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
  pub status:             Status,
  /// Appended after the record's existing events.
  pub event:              Option<ScanEvent>,
  pub scheduled_checkout: Option<DateTime<Utc>>,
}
