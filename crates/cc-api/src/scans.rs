//! Handler for `POST /scans`, the endpoint scanners post to.
//!
//! The body is `application/x-www-form-urlencoded`:
//!
//! | Field | Notes |
//! |-------|-------|
//! | `unique_transaction_id` | The `\|`-delimited scan payload |
//! | `temperature` | Degrees Fahrenheit |
//! | `scan_type` | `0` unspecified, `1` check-in, `2` check-out |
//! | `mask` | Face covering worn |
//! | `device_id` | Optional scanner id |

use axum::{Form, Json, extract::State};
use cc_core::{
  record::{ScanReading, Stage},
  store::{Directory, RecordStore},
};
use cc_scan::ScanOutcome;
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ScanForm {
  pub unique_transaction_id: String,
  pub temperature:           Option<String>,
  pub scan_type:             Option<String>,
  pub mask:                  Option<String>,
  pub device_id:             Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
  #[serde(flatten)]
  pub outcome: ScanOutcome,
  /// Survey page for the scanned person, on check-in only.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data:    Option<String>,
}

/// `POST /scans`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Form(form): Form<ScanForm>,
) -> Result<Json<ScanResponse>, ApiError>
where
  S: RecordStore + Directory,
{
  let reading = ScanReading::from_fields(
    form.temperature.as_deref(),
    form.scan_type.as_deref(),
    form.mask.as_deref(),
    form.device_id.as_deref(),
    state.scans.config().strictness,
  )?;

  let outcome = state
    .scans
    .handle_scan(&form.unique_transaction_id, reading)
    .await?;

  let data = match (&state.survey_base, outcome.stage) {
    (Some(base), Stage::CheckIn) => Some(survey_url(base, outcome.success)),
    _ => None,
  };
  Ok(Json(ScanResponse { outcome, data }))
}

fn survey_url(base: &str, success: bool) -> String {
  let page = if success { "succeed-page.html" } else { "failed-page.html" };
  format!("{}/surveys/{page}", base.trim_end_matches('/'))
}
