//! HTTP-facing error type. Maps session and generation failures onto status codes
//! with a `{ "error": code, "message": text }` body.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::generator::GenerationError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Session(#[from] SessionError),

  #[error("unknown session {0}")]
  UnknownSession(Uuid),

  #[error("unknown exercise {0}")]
  UnknownExercise(Uuid),
}

impl From<GenerationError> for ApiError {
  fn from(e: GenerationError) -> Self {
    ApiError::Session(SessionError::Generation(e))
  }
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Session(SessionError::Generation(e)) => match e {
        GenerationError::InvalidExerciseType(_) => StatusCode::BAD_REQUEST,
        GenerationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        GenerationError::ArtifactDir { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
      },
      ApiError::Session(SessionError::AtStart) => StatusCode::CONFLICT,
      ApiError::Session(SessionError::NoCurrent) => StatusCode::NOT_FOUND,
      ApiError::UnknownSession(_) | ApiError::UnknownExercise(_) => StatusCode::NOT_FOUND,
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      ApiError::Session(e) => e.code(),
      ApiError::UnknownSession(_) => "unknown_session",
      ApiError::UnknownExercise(_) => "unknown_exercise",
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(target: "circuit_tutor", code = self.code(), error = %self, "Request failed");
    }
    let body = Json(json!({
      "error": self.code(),
      "message": self.to_string(),
    }));
    (status, body).into_response()
  }
}
