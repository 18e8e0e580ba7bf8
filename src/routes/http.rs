//! HTTP endpoint handlers. Thin wrappers: look up the session, lock it, run one
//! session operation, and render the result.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::ExerciseType;
use crate::error::ApiError;
use crate::protocol::*;
use crate::session::SessionManager;
use crate::state::AppState;

pub(crate) fn parse_type(raw: Option<&str>) -> Result<Option<ExerciseType>, ApiError> {
  Ok(raw.map(str::parse::<ExerciseType>).transpose()?)
}

async fn lock(state: &AppState, id: Uuid) -> Result<OwnedMutexGuard<SessionManager>, ApiError> {
  state.lock_session(id).await.ok_or(ApiError::UnknownSession(id))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, sessions: state.session_count().await })
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_create_session(
  State(state): State<Arc<AppState>>,
  body: Option<Json<CreateSessionIn>>,
) -> Result<impl IntoResponse, ApiError> {
  let body = body.map(|Json(b)| b).unwrap_or_default();
  let kind = parse_type(body.exercise_type.as_deref())?;
  let (session_id, handle) = state.create_session(kind).await;
  let exercise_type = handle.lock().await.exercise_type();
  Ok((StatusCode::CREATED, Json(SessionOut { session_id, exercise_type })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  if state.remove_session(id).await {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::UnknownSession(id))
  }
}

#[instrument(level = "info", skip(state), fields(kind = ?q.exercise_type))]
pub async fn http_generate(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Query(q): Query<GenerateQuery>,
) -> Result<Json<ExerciseView>, ApiError> {
  let kind = parse_type(q.exercise_type.as_deref())?;
  let mut session = lock(&state, id).await?;
  session.generate(kind).await?;
  let view = ExerciseView::current(&session)?;
  info!(target: "session", session = %id, exercise = %view.exercise_id, "HTTP exercise generated");
  Ok(Json(view))
}

#[instrument(level = "info", skip(state))]
pub async fn http_next(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ExerciseView>, ApiError> {
  let mut session = lock(&state, id).await?;
  session.go_forward().await?;
  Ok(Json(ExerciseView::current(&session)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_back(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ExerciseView>, ApiError> {
  let mut session = lock(&state, id).await?;
  session.go_back()?;
  Ok(Json(ExerciseView::current(&session)?))
}

#[instrument(level = "info", skip(state, body), fields(kind = %body.exercise_type))]
pub async fn http_switch_type(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SwitchTypeIn>,
) -> Result<Json<ExerciseView>, ApiError> {
  let kind: ExerciseType = body.exercise_type.parse()?;
  let mut session = lock(&state, id).await?;
  session.switch_type(kind).await?;
  Ok(Json(ExerciseView::current(&session)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_current(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ExerciseView>, ApiError> {
  let session = lock(&state, id).await?;
  Ok(Json(ExerciseView::current(&session)?))
}

#[instrument(level = "info", skip(state, body), fields(field_id = %body.field_id, answer_len = body.value.len()))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<AnswerIn>,
) -> Result<Json<AnswerOut>, ApiError> {
  let session = lock(&state, id).await?;
  let result = session.submit_answer(&body.field_id, &body.value)?;
  Ok(Json(AnswerOut::from(&result)))
}

#[instrument(level = "info", skip(state, body), fields(count = body.answers.len()))]
pub async fn http_post_answers(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<AnswersIn>,
) -> Result<Json<Vec<AnswerOut>>, ApiError> {
  let session = lock(&state, id).await?;
  let results = session.submit_answers(body.answers.iter().map(|a| (a.field_id.as_str(), a.value.as_str())))?;
  Ok(Json(results.iter().map(AnswerOut::from).collect()))
}

/// Diagram of any exercise still held in the session history.
#[instrument(level = "debug", skip(state))]
pub async fn http_get_diagram(
  State(state): State<Arc<AppState>>,
  Path((id, exercise_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
  let session = lock(&state, id).await?;
  let record = session.history().get(exercise_id).ok_or(ApiError::UnknownExercise(exercise_id))?;
  let (bytes, mime) = record.diagram().best();
  Ok(([(header::CONTENT_TYPE, mime), (header::CACHE_CONTROL, "private, max-age=3600")], bytes.to_vec()).into_response())
}
