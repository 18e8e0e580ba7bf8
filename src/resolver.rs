//! Answer key resolution: which fields a learner must fill in for an exercise,
//! and the expected value behind each field id.

use serde::Serialize;

use crate::domain::{ExerciseRecord, Solution};

pub const FIELD_INITIAL: &str = "initial";
pub const FIELD_FINAL: &str = "final";
pub const FIELD_TAU: &str = "tau";
pub const FIELD_POWER_FACTOR: &str = "power_factor";
pub const POWER_PREFIX: &str = "power_";

/// Resolution result for one field of one record. Recomputed on every submission.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldAnswerKey {
  pub field_id: String,
  pub expected_value: f64,
  pub exists: bool,
}

impl FieldAnswerKey {
  fn found(field_id: &str, value: f64) -> Self {
    Self { field_id: field_id.to_string(), expected_value: value, exists: true }
  }

  fn missing(field_id: &str) -> Self {
    Self { field_id: field_id.to_string(), expected_value: 0.0, exists: false }
  }
}

/// One input the learner is expected to supply.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
  pub field_id: String,
  pub label: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub unit: Option<&'static str>,
}

impl FieldDescriptor {
  fn new(field_id: impl Into<String>, label: impl Into<String>, unit: Option<&'static str>) -> Self {
    Self { field_id: field_id.into(), label: label.into(), unit }
  }
}

pub fn resolve(record: &ExerciseRecord, field_id: &str) -> FieldAnswerKey {
  resolve_solution(record.solution(), field_id)
}

pub fn resolve_solution(solution: &Solution, field_id: &str) -> FieldAnswerKey {
  match solution {
    Solution::Dc(dc) => match field_id {
      FIELD_INITIAL => FieldAnswerKey::found(field_id, dc.initial),
      FIELD_FINAL => FieldAnswerKey::found(field_id, dc.final_value),
      FIELD_TAU => FieldAnswerKey::found(field_id, dc.tau),
      _ => FieldAnswerKey::missing(field_id),
    },
    Solution::Ac(ac) => {
      // Checked before the prefix so `power_factor` never reads as a component named "factor".
      if field_id == FIELD_POWER_FACTOR || field_id == "powerFactor" {
        return match ac.power_factor {
          Some(pf) => FieldAnswerKey::found(field_id, pf),
          None => FieldAnswerKey::missing(field_id),
        };
      }
      match field_id.strip_prefix(POWER_PREFIX).and_then(|name| ac.power_of(name)) {
        Some(watts) => FieldAnswerKey::found(field_id, watts),
        None => FieldAnswerKey::missing(field_id),
      }
    }
  }
}

pub fn answerable_fields(record: &ExerciseRecord) -> Vec<FieldDescriptor> {
  answerable_fields_for(record.solution())
}

pub fn answerable_fields_for(solution: &Solution) -> Vec<FieldDescriptor> {
  match solution {
    Solution::Dc(_) => vec![
      FieldDescriptor::new(FIELD_INITIAL, "Initial value (t=0⁻)", None),
      FieldDescriptor::new(FIELD_FINAL, "Final value (t=∞)", None),
      FieldDescriptor::new(FIELD_TAU, "Time constant (τ)", Some("s")),
    ],
    Solution::Ac(ac) => {
      let mut fields: Vec<FieldDescriptor> = ac
        .avg_power
        .iter()
        .map(|p| {
          FieldDescriptor::new(
            format!("{POWER_PREFIX}{}", p.component),
            format!("Average power {}", p.component),
            Some("W"),
          )
        })
        .collect();
      if ac.power_factor.is_some() {
        fields.push(FieldDescriptor::new(FIELD_POWER_FACTOR, "Power factor", None));
      }
      fields
    }
  }
}
