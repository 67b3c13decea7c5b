//! Registration endpoints for institutions, individuals and families.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use cc_core::{
  entity::{Family, Individual, Institution},
  store::{Directory, RecordStore},
};

use crate::{AppState, error::ApiError};

/// `POST /institutions`
pub async fn create_institution<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<Institution>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + Directory,
{
  let institution = state.scans.add_institution(body).await?;
  Ok((StatusCode::CREATED, Json(institution)))
}

/// `GET /institutions/{id}`
pub async fn get_institution<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Institution>, ApiError>
where
  S: RecordStore + Directory,
{
  Ok(Json(state.scans.institution(&id).await?))
}

/// `POST /individuals`
pub async fn create_individual<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<Individual>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + Directory,
{
  let individual = state.scans.add_individual(body).await?;
  Ok((StatusCode::CREATED, Json(individual)))
}

/// `POST /families` — the family and all its dependents in one body.
pub async fn create_family<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<Family>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + Directory,
{
  let family = state.scans.add_family(body).await?;
  Ok((StatusCode::CREATED, Json(family)))
}
