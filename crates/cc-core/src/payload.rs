//! Scan payload grammar.
//!
//! Scanners post a single `|`-delimited string. The number of fields selects
//! the scan mode:
//!
//! | Fields | Mode | Layout |
//! |--------|------|--------|
//! | 5 | dependent  | `guardian_id\|dependent_id\|stage\|fan_out\|epoch_ms` |
//! | 3 | individual | `individual_id\|stage\|epoch_ms` |
//! | 4 | tag        | `institution_identifier\|tag_string\|_\|epoch_ms` |
//!
//! The payload is decoded once into an [`EventDescriptor`]; nothing
//! downstream looks at the raw string again.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  record::{FanOut, ScanReading, ScanType, Stage},
};

const DELIMITER: char = '|';

// ─── Strictness ──────────────────────────────────────────────────────────────

/// How to treat numeric and boolean sub-fields that fail to convert.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
  /// Substitute the zero value, as deployed scanners have always relied on.
  #[default]
  Lenient,
  /// Reject the scan with [`Error::BadPayload`].
  Strict,
}

impl Strictness {
  fn convert<T>(self, field: &str, raw: &str) -> Result<T>
  where
    T: FromStr + Default,
  {
    match raw.parse::<T>() {
      Ok(v) => Ok(v),
      Err(_) if self == Self::Lenient => Ok(T::default()),
      Err(_) => {
        Err(Error::BadPayload(format!("{field} is not a valid value: {raw:?}")))
      }
    }
  }
}

// ─── EventDescriptor ─────────────────────────────────────────────────────────

/// A decoded scan payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDescriptor {
  /// A guardian scanning for one dependent or the whole family.
  Dependent {
    guardian_id:  String,
    dependent_id: String,
    stage:        Stage,
    fan_out:      FanOut,
    scanned_at:   DateTime<Utc>,
  },
  /// An individual scanning their own badge.
  Individual {
    individual_id: String,
    stage:         Stage,
    scanned_at:    DateTime<Utc>,
  },
  /// An anonymous tag. The stage is derived from record state later.
  Tag {
    institution_identifier: String,
    tag_string:             String,
    scanned_at:             DateTime<Utc>,
  },
}

impl EventDescriptor {
  /// Decode `raw` according to the field-count grammar.
  pub fn parse(raw: &str, strictness: Strictness) -> Result<Self> {
    let fields: Vec<&str> = raw.split(DELIMITER).collect();
    match fields.as_slice() {
      [guardian, dependent, stage, fan_out, millis] => Ok(Self::Dependent {
        guardian_id:  (*guardian).to_owned(),
        dependent_id: (*dependent).to_owned(),
        stage:        parse_stage(stage)?,
        fan_out:      if *fan_out == "all" { FanOut::All } else { FanOut::Single },
        scanned_at:   parse_millis(millis, strictness)?,
      }),
      [individual, stage, millis] => Ok(Self::Individual {
        individual_id: (*individual).to_owned(),
        stage:         parse_stage(stage)?,
        scanned_at:    parse_millis(millis, strictness)?,
      }),
      [identifier, tag, _unused, millis] => Ok(Self::Tag {
        institution_identifier: (*identifier).to_owned(),
        tag_string:             (*tag).to_owned(),
        scanned_at:             parse_millis(millis, strictness)?,
      }),
      _ => Err(Error::BadPayload(format!(
        "expected 3, 4 or 5 fields, got {}",
        fields.len()
      ))),
    }
  }

  /// The stage carried by the payload; tag scans carry none.
  pub fn stage(&self) -> Option<Stage> {
    match self {
      Self::Dependent { stage, .. } | Self::Individual { stage, .. } => {
        Some(*stage)
      }
      Self::Tag { .. } => None,
    }
  }

  pub fn scanned_at(&self) -> DateTime<Utc> {
    match self {
      Self::Dependent { scanned_at, .. }
      | Self::Individual { scanned_at, .. }
      | Self::Tag { scanned_at, .. } => *scanned_at,
    }
  }
}

fn parse_stage(raw: &str) -> Result<Stage> {
  Stage::from_str(raw)
    .map_err(|_| Error::BadPayload(format!("unknown stage: {raw:?}")))
}

/// Epoch milliseconds, truncated toward zero to whole seconds.
fn parse_millis(raw: &str, strictness: Strictness) -> Result<DateTime<Utc>> {
  let millis: i64 = strictness.convert("timestamp", raw)?;
  match DateTime::from_timestamp(millis / 1000, 0) {
    Some(dt) => Ok(dt),
    None if strictness == Strictness::Lenient => Ok(DateTime::<Utc>::UNIX_EPOCH),
    None => Err(Error::BadPayload(format!("timestamp out of range: {raw}"))),
  }
}

// ─── Form fields ─────────────────────────────────────────────────────────────

impl ScanReading {
  /// Decode the form fields scanners post next to the payload.
  ///
  /// Missing fields are treated like malformed ones. A non-finite
  /// temperature is refused under either strictness.
  pub fn from_fields(
    temperature: Option<&str>,
    scan_type: Option<&str>,
    face_covering: Option<&str>,
    device_id: Option<&str>,
    strictness: Strictness,
  ) -> Result<Self> {
    let temperature: f32 =
      strictness.convert("temperature", temperature.unwrap_or_default())?;
    if !temperature.is_finite() {
      return Err(Error::BadPayload(format!(
        "temperature is not a finite reading: {temperature}"
      )));
    }
    let code: i64 =
      strictness.convert("scan_type", scan_type.unwrap_or_default())?;
    let scan_type = match ScanType::from_code(code) {
      Some(t) => t,
      None if strictness == Strictness::Lenient => ScanType::Unspecified,
      None => {
        return Err(Error::BadPayload(format!("unknown scan_type: {code}")));
      }
    };
    let face_covering = match face_covering.unwrap_or_default() {
      "1" | "t" | "T" | "true" | "TRUE" | "True" => true,
      "0" | "f" | "F" | "false" | "FALSE" | "False" => false,
      _ if strictness == Strictness::Lenient => false,
      other => {
        return Err(Error::BadPayload(format!("mask is not a flag: {other:?}")));
      }
    };

    Ok(Self {
      scan_type,
      temperature,
      face_covering,
      device_id: device_id.filter(|d| !d.is_empty()).map(str::to_owned),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { DateTime::from_timestamp(secs, 0).unwrap() }

  // ── Field-count grammar ───────────────────────────────────────────────────

  #[test]
  fn five_fields_single_dependent() {
    let d = EventDescriptor::parse(
      "dep1|ward1|checkout|single|1700003600000",
      Strictness::Lenient,
    )
    .unwrap();
    assert_eq!(d, EventDescriptor::Dependent {
      guardian_id:  "dep1".into(),
      dependent_id: "ward1".into(),
      stage:        Stage::CheckOut,
      fan_out:      FanOut::Single,
      scanned_at:   at(1_700_003_600),
    });
  }

  #[test]
  fn five_fields_fan_out_all() {
    let d = EventDescriptor::parse(
      "g1|w1|checkin|all|1700000000999",
      Strictness::Strict,
    )
    .unwrap();
    let EventDescriptor::Dependent { fan_out, scanned_at, .. } = d else {
      panic!("expected dependent scan")
    };
    assert_eq!(fan_out, FanOut::All);
    assert_eq!(scanned_at, at(1_700_000_000), "millis must be truncated");
  }

  #[test]
  fn any_other_fan_out_word_means_single() {
    let d = EventDescriptor::parse("g1|w1|checkin|ALL|0", Strictness::Strict)
      .unwrap();
    assert!(matches!(d, EventDescriptor::Dependent {
      fan_out: FanOut::Single,
      ..
    }));
  }

  #[test]
  fn three_fields_individual() {
    let d = EventDescriptor::parse(
      "member123|checkin|1700000000000",
      Strictness::Lenient,
    )
    .unwrap();
    assert_eq!(d, EventDescriptor::Individual {
      individual_id: "member123".into(),
      stage:         Stage::CheckIn,
      scanned_at:    at(1_700_000_000),
    });
    assert_eq!(d.stage(), Some(Stage::CheckIn));
  }

  #[test]
  fn four_fields_tag_has_no_stage() {
    let d =
      EventDescriptor::parse("INST01|tagXYZ|_|1700000000000", Strictness::Lenient)
        .unwrap();
    assert_eq!(d, EventDescriptor::Tag {
      institution_identifier: "INST01".into(),
      tag_string:             "tagXYZ".into(),
      scanned_at:             at(1_700_000_000),
    });
    assert_eq!(d.stage(), None);
  }

  #[test]
  fn other_field_counts_are_bad_payloads() {
    for raw in ["", "one", "a|b", "a|b|c|d|e|f", "a|b|c|d|e|f|g"] {
      let r = EventDescriptor::parse(raw, Strictness::Lenient);
      assert!(matches!(r, Err(Error::BadPayload(_))), "{raw:?} parsed");
    }
  }

  #[test]
  fn unknown_stage_is_rejected() {
    let r = EventDescriptor::parse("m1|leaving|0", Strictness::Lenient);
    assert!(matches!(r, Err(Error::BadPayload(_))));
  }

  // ── Strictness ────────────────────────────────────────────────────────────

  #[test]
  fn lenient_defaults_malformed_timestamp_to_epoch() {
    let d =
      EventDescriptor::parse("m1|checkin|not-a-number", Strictness::Lenient)
        .unwrap();
    assert_eq!(d.scanned_at(), DateTime::<Utc>::UNIX_EPOCH);
  }

  #[test]
  fn strict_rejects_malformed_timestamp() {
    let r = EventDescriptor::parse("m1|checkin|not-a-number", Strictness::Strict);
    assert!(matches!(r, Err(Error::BadPayload(_))));
  }

  #[test]
  fn reading_from_well_formed_fields() {
    let r = ScanReading::from_fields(
      Some("98.4"),
      Some("1"),
      Some("true"),
      Some("gate-2"),
      Strictness::Strict,
    )
    .unwrap();
    assert_eq!(r.temperature, 98.4);
    assert_eq!(r.scan_type, ScanType::CheckIn);
    assert!(r.face_covering);
    assert_eq!(r.device_id.as_deref(), Some("gate-2"));
  }

  #[test]
  fn lenient_reading_zeroes_garbage() {
    let r = ScanReading::from_fields(
      Some("hot"),
      Some("9"),
      None,
      Some(""),
      Strictness::Lenient,
    )
    .unwrap();
    assert_eq!(r, ScanReading::default());
  }

  #[test]
  fn strict_reading_rejects_garbage() {
    let r = ScanReading::from_fields(
      Some("hot"),
      Some("1"),
      Some("true"),
      None,
      Strictness::Strict,
    );
    assert!(matches!(r, Err(Error::BadPayload(_))));
  }

  #[test]
  fn non_finite_temperature_is_rejected_in_both_modes() {
    for raw in ["NaN", "nan", "inf", "-inf", "infinity"] {
      for strictness in [Strictness::Lenient, Strictness::Strict] {
        let r = ScanReading::from_fields(
          Some(raw),
          Some("1"),
          Some("true"),
          None,
          strictness,
        );
        assert!(matches!(r, Err(Error::BadPayload(_))), "{raw} {strictness:?}");
      }
    }
  }
}
