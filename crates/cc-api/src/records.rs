//! Handlers for `/records` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/records` | Filters, see [`ListParams`] |
//! | `POST`   | `/records/schedule` | Body: `{"dependent_ids":[..],"timestamp":<epoch s>}` |
//! | `POST`   | `/records/sync` | Body: `{"institution_id":..,"individual_id"?:..,"dependent_ids"?:[..]}` |
//! | `GET`    | `/records/{id}` | 404 if not found |
//! | `DELETE` | `/records/{id}` | 204, or 404 if not found |

use std::str::FromStr;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use cc_core::{
  record::{CcRecord, Status},
  store::{Directory, RecordFilter, RecordStore},
};
use cc_scan::{RecordRef, SyncRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub institution_id:  Option<String>,
  pub subject_id:      Option<String>,
  pub status:          Option<Status>,
  /// Comma-separated statuses to leave out, e.g. `failed,check_out_complete`.
  pub exclude:         Option<String>,
  pub created_after:   Option<DateTime<Utc>>,
  pub created_before:  Option<DateTime<Utc>>,
  pub min_temperature: Option<f32>,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

impl ListParams {
  fn into_filter(self) -> Result<RecordFilter, ApiError> {
    let exclude = match self.exclude.as_deref() {
      None | Some("") => Vec::new(),
      Some(list) => list
        .split(',')
        .map(|s| {
          Status::from_str(s.trim())
            .map_err(|_| ApiError::BadRequest(format!("unknown status: {s}")))
        })
        .collect::<Result<_, _>>()?,
    };

    Ok(RecordFilter {
      institution_id: self.institution_id,
      subject_id: self.subject_id,
      status: self.status,
      exclude,
      created_after: self.created_after,
      created_before: self.created_before,
      min_temperature: self.min_temperature,
      limit: self.limit,
      offset: self.offset,
    })
  }
}

/// `GET /records[?institution_id=..&status=..&exclude=..&limit=..]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<CcRecord>>, ApiError>
where
  S: RecordStore + Directory,
{
  let filter = params.into_filter()?;
  Ok(Json(state.scans.records(&filter).await?))
}

// ─── Schedule ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScheduleBody {
  pub dependent_ids: Vec<String>,
  /// Pickup time, epoch seconds.
  pub timestamp:     i64,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
  pub records: Vec<RecordRef>,
}

/// `POST /records/schedule`
pub async fn schedule<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<ScheduleBody>,
) -> Result<Json<ScheduleResponse>, ApiError>
where
  S: RecordStore + Directory,
{
  let at = DateTime::from_timestamp(body.timestamp, 0).ok_or_else(|| {
    ApiError::BadRequest(format!("timestamp out of range: {}", body.timestamp))
  })?;
  let records = state.scans.schedule_checkout(&body.dependent_ids, at).await?;
  Ok(Json(ScheduleResponse { records }))
}

// ─── Sync ────────────────────────────────────────────────────────────────────

/// `POST /records/sync`
pub async fn sync<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<SyncRequest>,
) -> Result<Json<Vec<CcRecord>>, ApiError>
where
  S: RecordStore + Directory,
{
  Ok(Json(state.scans.sync_records(&body).await?))
}

// ─── Get / delete one ────────────────────────────────────────────────────────

/// `GET /records/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<CcRecord>, ApiError>
where
  S: RecordStore + Directory,
{
  Ok(Json(state.scans.record(id).await?))
}

/// `DELETE /records/{id}`
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: RecordStore + Directory,
{
  state.scans.delete_record(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
