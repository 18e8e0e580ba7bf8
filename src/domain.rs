//! Domain models: exercise types, the tagged solution payload, diagrams and exercise records.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generator::GenerationError;

/// Which family of circuit exercise is requested from the generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExerciseType {
  /// First-order transient after a switch event.
  #[serde(rename = "DC", alias = "dc")]
  Dc,
  /// Sinusoidal steady state, average power per resistor.
  #[serde(rename = "AC", alias = "ac")]
  Ac,
}

impl Default for ExerciseType {
  fn default() -> Self { ExerciseType::Dc }
}

impl ExerciseType {
  /// Selector passed to the generator process.
  pub fn as_arg(&self) -> &'static str {
    match self {
      ExerciseType::Dc => "DC",
      ExerciseType::Ac => "AC",
    }
  }
}

impl fmt::Display for ExerciseType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_arg())
  }
}

impl FromStr for ExerciseType {
  type Err = GenerationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let t = s.trim();
    if t.eq_ignore_ascii_case("DC") {
      Ok(ExerciseType::Dc)
    } else if t.eq_ignore_ascii_case("AC") {
      Ok(ExerciseType::Ac)
    } else {
      Err(GenerationError::InvalidExerciseType(t.to_string()))
    }
  }
}

/// Ground truth for a DC transient exercise.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DcSolution {
  pub initial: f64,
  #[serde(rename = "final")]
  pub final_value: f64,
  pub tau: f64,
  /// Name of the time-domain quantity asked for, e.g. `v_C` or `i_L`.
  pub variable: String,
}

/// Average power dissipated by one named component.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComponentPower {
  pub component: String,
  pub watts: f64,
}

/// Ground truth for an AC steady-state exercise.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AcSolution {
  pub frequency: f64,
  pub omega: f64,
  pub source_waveform: String,
  pub source_amplitude: f64,
  /// Kept in the generator's own key order; it drives the order of answer fields.
  pub avg_power: Vec<ComponentPower>,
  pub power_factor: Option<f64>,
}

impl AcSolution {
  pub fn power_of(&self, component: &str) -> Option<f64> {
    self.avg_power.iter().find(|p| p.component == component).map(|p| p.watts)
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "exercise_type")]
pub enum Solution {
  #[serde(rename = "DC")]
  Dc(DcSolution),
  #[serde(rename = "AC")]
  Ac(AcSolution),
}

impl Solution {
  pub fn exercise_type(&self) -> ExerciseType {
    match self {
      Solution::Dc(_) => ExerciseType::Dc,
      Solution::Ac(_) => ExerciseType::Ac,
    }
  }

  /// Learner-facing prompt. Pure function of the stored solution, so revisiting a
  /// record always yields the text it was first shown with.
  pub fn question_text(&self) -> String {
    match self {
      Solution::Dc(dc) => format!(
        "The switch changes state at t=0. Compute the transient response {}(t).",
        dc.variable
      ),
      Solution::Ac(ac) => format!(
        "AC circuit with i_s(t) = {}*{}({}t) A. Compute the requested values.",
        ac.source_amplitude,
        ac.source_waveform,
        ac.omega.trunc() as i64
      ),
    }
  }
}

/// Rendered circuit diagram owned by a single record.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagram {
  pub svg: Vec<u8>,
  /// Absent when rasterization is disabled; the SVG is served instead.
  pub png: Option<Vec<u8>>,
}

impl Diagram {
  /// Preferred bytes to present plus their MIME type.
  pub fn best(&self) -> (&[u8], &'static str) {
    match &self.png {
      Some(png) => (png.as_slice(), "image/png"),
      None => (self.svg.as_slice(), "image/svg+xml"),
    }
  }
}

/// One generated exercise. Immutable after construction.
#[derive(Clone, Debug)]
pub struct ExerciseRecord {
  id: Uuid,
  solution: Solution,
  question_text: String,
  diagram: Diagram,
  created_at: DateTime<Utc>,
}

impl ExerciseRecord {
  pub fn new(solution: Solution, diagram: Diagram) -> Self {
    let question_text = solution.question_text();
    Self {
      id: Uuid::new_v4(),
      solution,
      question_text,
      diagram,
      created_at: Utc::now(),
    }
  }

  pub fn id(&self) -> Uuid { self.id }
  pub fn exercise_type(&self) -> ExerciseType { self.solution.exercise_type() }
  pub fn solution(&self) -> &Solution { &self.solution }
  pub fn question_text(&self) -> &str { &self.question_text }
  pub fn diagram(&self) -> &Diagram { &self.diagram }
  pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
}
