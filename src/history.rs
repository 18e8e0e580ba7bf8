//! Linear, truncating exercise history with a single cursor (browser-history semantics).

use thiserror::Error;
use uuid::Uuid;

use crate::domain::ExerciseRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
  #[error("already at the first exercise")]
  AtStart,
  #[error("already at the last exercise")]
  AtEnd,
  #[error("no exercise has been generated yet")]
  NoCurrent,
}

#[derive(Debug, Default)]
pub struct HistoryStore {
  records: Vec<ExerciseRecord>,
  /// `None` iff `records` is empty.
  cursor: Option<usize>,
}

impl HistoryStore {
  pub fn new() -> Self { Self::default() }

  /// Drops every record after the cursor, then pushes and moves the cursor onto the new record.
  pub fn append(&mut self, record: ExerciseRecord) -> &ExerciseRecord {
    if let Some(c) = self.cursor {
      self.records.truncate(c + 1);
    }
    self.records.push(record);
    let last = self.records.len() - 1;
    self.cursor = Some(last);
    &self.records[last]
  }

  pub fn seek_back(&mut self) -> Result<&ExerciseRecord, HistoryError> {
    match self.cursor {
      Some(c) if c > 0 => {
        self.cursor = Some(c - 1);
        Ok(&self.records[c - 1])
      }
      _ => Err(HistoryError::AtStart),
    }
  }

  pub fn seek_forward(&mut self) -> Result<&ExerciseRecord, HistoryError> {
    match self.cursor {
      Some(c) if c + 1 < self.records.len() => {
        self.cursor = Some(c + 1);
        Ok(&self.records[c + 1])
      }
      _ => Err(HistoryError::AtEnd),
    }
  }

  pub fn reset(&mut self) {
    self.records.clear();
    self.cursor = None;
  }

  pub fn current(&self) -> Result<&ExerciseRecord, HistoryError> {
    self.cursor.map(|c| &self.records[c]).ok_or(HistoryError::NoCurrent)
  }

  pub fn position(&self) -> Option<usize> { self.cursor }
  pub fn len(&self) -> usize { self.records.len() }
  pub fn is_empty(&self) -> bool { self.records.is_empty() }
  pub fn has_prev(&self) -> bool { matches!(self.cursor, Some(c) if c > 0) }
  pub fn has_next(&self) -> bool { matches!(self.cursor, Some(c) if c + 1 < self.records.len()) }

  /// Any retained record by id, not just the current one.
  pub fn get(&self, id: Uuid) -> Option<&ExerciseRecord> {
    self.records.iter().find(|r| r.id() == id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ExerciseRecord> {
    self.records.iter()
  }
}
