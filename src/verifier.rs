//! Numeric answer grading against a resolved answer key.
//!
//! Relative error with a fixed 5% tolerance. Expected values within 1e-9 of zero
//! switch to absolute error, since a relative measure is meaningless there.

use serde::Serialize;

use crate::resolver::FieldAnswerKey;

/// Answers strictly below this error are accepted.
pub const TOLERANCE: f64 = 0.05;
/// Below this magnitude the expected value is treated as zero.
pub const NEAR_ZERO: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  Correct,
  Incorrect,
  /// Empty or non-numeric input.
  Unparseable,
  /// The field has no expected value for this exercise.
  NoSolution,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VerificationResult {
  pub field_id: String,
  pub user_value: Option<f64>,
  pub expected_value: Option<f64>,
  pub relative_error: Option<f64>,
  pub verdict: Verdict,
}

impl VerificationResult {
  pub fn is_correct(&self) -> bool { self.verdict == Verdict::Correct }
}

/// Parse a learner answer. `None` for empty, non-numeric, or non-finite text.
pub fn parse_answer(user_text: &str) -> Option<f64> {
  let t = user_text.trim();
  if t.is_empty() {
    return None;
  }
  t.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Error metric used for grading: relative when the expected value is non-zero,
/// absolute otherwise.
pub fn relative_error(user: f64, expected: f64) -> f64 {
  let diff = (user - expected).abs();
  if expected.abs() > NEAR_ZERO { diff / expected.abs() } else { diff }
}

pub fn verify(user_text: &str, key: &FieldAnswerKey) -> VerificationResult {
  let field_id = key.field_id.clone();
  if !key.exists {
    return VerificationResult {
      field_id,
      user_value: parse_answer(user_text),
      expected_value: None,
      relative_error: None,
      verdict: Verdict::NoSolution,
    };
  }

  let Some(user_value) = parse_answer(user_text) else {
    return VerificationResult {
      field_id,
      user_value: None,
      expected_value: Some(key.expected_value),
      relative_error: None,
      verdict: Verdict::Unparseable,
    };
  };

  let err = relative_error(user_value, key.expected_value);
  let verdict = if err < TOLERANCE { Verdict::Correct } else { Verdict::Incorrect };
  VerificationResult {
    field_id,
    user_value: Some(user_value),
    expected_value: Some(key.expected_value),
    relative_error: Some(err),
    verdict,
  }
}
