//! Exercise session: the state machine tying generation, history navigation and grading together.
//!
//! A session is `Empty` until its first successful generation and `Active` afterwards.
//! Callers serialize access (the registry wraps each session in a mutex), so every
//! operation runs to completion before the next one starts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{ExerciseRecord, ExerciseType};
use crate::generator::{ExerciseGenerator, GenerationError};
use crate::history::{HistoryError, HistoryStore};
use crate::resolver;
use crate::verifier::{self, VerificationResult};

#[derive(Debug, Error)]
pub enum SessionError {
  #[error(transparent)]
  Generation(#[from] GenerationError),
  /// Navigation signal: there is nothing before the current exercise.
  #[error("already at the first exercise")]
  AtStart,
  #[error("no exercise has been generated yet")]
  NoCurrent,
}

impl SessionError {
  pub fn code(&self) -> &'static str {
    match self {
      SessionError::Generation(e) => e.code(),
      SessionError::AtStart => "at_start",
      SessionError::NoCurrent => "no_current",
    }
  }
}

impl From<HistoryError> for SessionError {
  fn from(e: HistoryError) -> Self {
    match e {
      HistoryError::AtStart => SessionError::AtStart,
      // Forward past the end is resolved by generating, so it never surfaces here.
      HistoryError::AtEnd | HistoryError::NoCurrent => SessionError::NoCurrent,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
  Empty,
  Active {
    position: usize,
    len: usize,
    has_prev: bool,
    has_next: bool,
  },
}

pub struct SessionManager {
  id: Uuid,
  exercise_type: ExerciseType,
  history: HistoryStore,
  generator: Arc<dyn ExerciseGenerator>,
  artifact_dir: PathBuf,
  timeout: Duration,
  /// Set once the registry has dropped the session; handles cloned earlier must stop using it.
  closed: bool,
}

impl SessionManager {
  pub fn new(
    id: Uuid,
    exercise_type: ExerciseType,
    generator: Arc<dyn ExerciseGenerator>,
    artifact_dir: PathBuf,
    timeout: Duration,
  ) -> Self {
    Self { id, exercise_type, history: HistoryStore::new(), generator, artifact_dir, timeout, closed: false }
  }

  pub fn id(&self) -> Uuid { self.id }
  pub fn exercise_type(&self) -> ExerciseType { self.exercise_type }
  pub fn artifact_dir(&self) -> &Path { &self.artifact_dir }
  pub fn history(&self) -> &HistoryStore { &self.history }
  pub fn is_closed(&self) -> bool { self.closed }

  /// Mark the session as removed. Called with the session lock held, right before its
  /// artifact directory is deleted.
  pub fn close(&mut self) {
    self.closed = true;
  }

  pub fn status(&self) -> SessionStatus {
    match self.history.position() {
      None => SessionStatus::Empty,
      Some(position) => SessionStatus::Active {
        position,
        len: self.history.len(),
        has_prev: self.history.has_prev(),
        has_next: self.history.has_next(),
      },
    }
  }

  pub fn current(&self) -> Result<&ExerciseRecord, SessionError> {
    Ok(self.history.current()?)
  }

  /// Generate a fresh exercise of the session's type and make it current.
  /// On failure nothing changes and the error is returned as is.
  #[instrument(level = "info", skip(self), fields(session = %self.id, kind = %self.exercise_type))]
  pub async fn generate_next(&mut self) -> Result<&ExerciseRecord, SessionError> {
    let record = self.fetch(self.exercise_type).await?;
    let position = self.history.position().map_or(0, |p| p + 1);
    let truncated = self.history.len() - position;
    let record = self.history.append(record);
    info!(
      target: "session",
      session = %self.id,
      id = %record.id(),
      position,
      truncated,
      "Exercise appended"
    );
    Ok(record)
  }

  /// Step back one exercise. The record comes back with its own retained diagram and
  /// the question text derived from its stored solution.
  #[instrument(level = "info", skip(self), fields(session = %self.id))]
  pub fn go_back(&mut self) -> Result<&ExerciseRecord, SessionError> {
    let record = self.history.seek_back().map_err(|e| {
      debug!(target: "session", "Back requested at start of history");
      SessionError::from(e)
    })?;
    debug!(target: "session", id = %record.id(), "Moved back");
    Ok(record)
  }

  /// Step forward; at the end of history this is exactly `generate_next`.
  #[instrument(level = "info", skip(self), fields(session = %self.id))]
  pub async fn go_forward(&mut self) -> Result<&ExerciseRecord, SessionError> {
    if self.history.has_next() {
      let record = self.history.seek_forward()?;
      debug!(target: "session", id = %record.id(), "Moved forward");
      return Ok(record);
    }
    self.generate_next().await
  }

  /// Change exercise type: history is discarded and a first exercise of the new type
  /// generated. Same type is a no-op that returns the current exercise.
  ///
  /// The new exercise is fetched before the old history is dropped, so a failed
  /// generation leaves type and history exactly as they were.
  #[instrument(level = "info", skip(self), fields(session = %self.id, from = %self.exercise_type, to = %kind))]
  pub async fn switch_type(&mut self, kind: ExerciseType) -> Result<&ExerciseRecord, SessionError> {
    if kind == self.exercise_type {
      return self.current();
    }
    let record = self.fetch(kind).await?;
    let dropped = self.history.len();
    self.history.reset();
    self.exercise_type = kind;
    info!(target: "session", session = %self.id, %kind, dropped, "Exercise type switched");
    Ok(self.history.append(record))
  }

  /// Entry point behind `generate(type)`: switch when the type differs, else generate next.
  pub async fn generate(&mut self, kind: Option<ExerciseType>) -> Result<&ExerciseRecord, SessionError> {
    match kind {
      Some(k) if k != self.exercise_type => self.switch_type(k).await,
      _ => self.generate_next().await,
    }
  }

  /// Grade one answer against the current exercise. Never touches history.
  #[instrument(level = "info", skip(self, user_text), fields(session = %self.id, %field_id, answer_len = user_text.len()))]
  pub fn submit_answer(&self, field_id: &str, user_text: &str) -> Result<VerificationResult, SessionError> {
    let record = self.current()?;
    let key = resolver::resolve(record, field_id);
    let result = verifier::verify(user_text, &key);
    info!(target: "session", id = %record.id(), %field_id, verdict = ?result.verdict, "Answer graded");
    Ok(result)
  }

  /// Grade several fields independently; a bad field never blocks the others.
  pub fn submit_answers<'a, I>(&self, answers: I) -> Result<Vec<VerificationResult>, SessionError>
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let record = self.current()?;
    Ok(
      answers
        .into_iter()
        .map(|(field_id, text)| verifier::verify(text, &resolver::resolve(record, field_id)))
        .collect(),
    )
  }

  async fn fetch(&self, kind: ExerciseType) -> Result<ExerciseRecord, SessionError> {
    self.generator
      .generate(kind, &self.artifact_dir, self.timeout)
      .await
      .map_err(|e| {
        warn!(target: "session", session = %self.id, %kind, code = e.code(), error = %e, "Generation failed");
        SessionError::Generation(e)
      })
  }
}
