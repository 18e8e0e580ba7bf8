//! Client for the external circuit generator and the SVG rasterizer.
//!
//! One `generate` call:
//!   1) runs `<program> <mode> <DC|AC>` inside the session's artifact directory,
//!   2) pulls the JSON object out of stdout and decodes it into a typed `Solution`,
//!   3) reads the SVG the generator wrote and converts it to PNG,
//!   4) returns an `ExerciseRecord` that owns both diagram artifacts.
//!
//! Both external calls are bounded by the same timeout. Children are spawned with
//! `kill_on_drop`, so a timed-out or cancelled call leaves nothing running.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::domain::{AcSolution, ComponentPower, DcSolution, Diagram, ExerciseRecord, ExerciseType, Solution};
use crate::util::{extract_json_object, trunc_for_log};

/// External step that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Generation,
  Rasterization,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Stage::Generation => f.write_str("generation"),
      Stage::Rasterization => f.write_str("rasterization"),
    }
  }
}

#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("invalid exercise type {0:?} (expected DC or AC)")]
  InvalidExerciseType(String),

  #[error("generator exited with {status}: {stderr}")]
  ProcessFailed { status: String, stderr: String },

  #[error("malformed generator output: {0}")]
  MalformedOutput(String),

  #[error("{stage} timed out after {}ms", .after.as_millis())]
  Timeout { stage: Stage, after: Duration },

  /// The solution was valid but the diagram could not be produced.
  #[error("diagram rendering failed: {0}")]
  RenderFailed(String),

  /// The session's working directory could not be prepared.
  #[error("artifact directory {path}: {source}")]
  ArtifactDir {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to launch generator {program}: {source}")]
  Io {
    program: String,
    #[source]
    source: std::io::Error,
  },
}

impl GenerationError {
  /// Stable machine-readable code for API payloads.
  pub fn code(&self) -> &'static str {
    match self {
      GenerationError::InvalidExerciseType(_) => "invalid_exercise_type",
      GenerationError::ProcessFailed { .. } | GenerationError::Io { .. } => "process_failed",
      GenerationError::MalformedOutput(_) => "malformed_output",
      GenerationError::Timeout { .. } => "timeout",
      GenerationError::RenderFailed(_) => "render_failed",
      GenerationError::ArtifactDir { .. } => "artifact_io",
    }
  }
}

/// Source of fresh exercises. The session only talks to this trait.
#[async_trait]
pub trait ExerciseGenerator: Send + Sync {
  async fn generate(
    &self,
    kind: ExerciseType,
    artifact_dir: &Path,
    timeout: Duration,
  ) -> Result<ExerciseRecord, GenerationError>;
}

#[derive(Clone, Debug)]
pub struct GeneratorClient {
  pub program: PathBuf,
  pub mode: String,
  pub diagram_file: String,
  /// `None` keeps only the SVG.
  pub rasterizer: Option<String>,
}

impl GeneratorClient {
  pub fn from_config(cfg: &AppConfig) -> Self {
    Self {
      program: absolutize(&cfg.generator.program),
      mode: cfg.generator.mode.clone(),
      diagram_file: cfg.generator.diagram_file.clone(),
      rasterizer: cfg.rasterizer.enabled().map(str::to_string),
    }
  }

  #[instrument(level = "debug", skip(self, svg_path, png_path))]
  async fn rasterize(&self, program: &str, svg_path: &Path, png_path: &Path, timeout: Duration) -> Result<Vec<u8>, GenerationError> {
    let mut cmd = Command::new(program);
    cmd.arg(svg_path).arg("-o").arg(png_path);

    let output = match run_with_timeout(cmd, Stage::Rasterization, timeout).await {
      Ok(out) => out,
      Err(GenerationError::Io { program, source }) => {
        return Err(GenerationError::RenderFailed(format!("cannot launch {program}: {source}")));
      }
      Err(e) => return Err(e),
    };
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(GenerationError::RenderFailed(format!(
        "{program} exited with {}: {}",
        output.status,
        trunc_for_log(stderr.trim(), 512)
      )));
    }
    tokio::fs::read(png_path)
      .await
      .map_err(|e| GenerationError::RenderFailed(format!("cannot read {}: {e}", png_path.display())))
  }
}

#[async_trait]
impl ExerciseGenerator for GeneratorClient {
  #[instrument(level = "info", skip(self, artifact_dir), fields(%kind, dir = %artifact_dir.display()))]
  async fn generate(
    &self,
    kind: ExerciseType,
    artifact_dir: &Path,
    timeout: Duration,
  ) -> Result<ExerciseRecord, GenerationError> {
    tokio::fs::create_dir_all(artifact_dir).await.map_err(|source| GenerationError::ArtifactDir {
      path: artifact_dir.display().to_string(),
      source,
    })?;
    let svg_path = artifact_dir.join(&self.diagram_file);
    // A stale diagram from the previous call must never be attributed to this exercise.
    if let Err(source) = tokio::fs::remove_file(&svg_path).await {
      if source.kind() != std::io::ErrorKind::NotFound {
        warn!(target: "generator", path = %svg_path.display(), error = %source, "Cannot clear previous diagram");
        return Err(GenerationError::ArtifactDir { path: svg_path.display().to_string(), source });
      }
    }

    let started = Instant::now();
    let mut cmd = Command::new(&self.program);
    cmd.arg(&self.mode).arg(kind.as_arg()).current_dir(artifact_dir);
    let output = run_with_timeout(cmd, Stage::Generation, timeout).await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      warn!(target: "generator", status = %output.status, stderr = %trunc_for_log(&stderr, 512), "Generator failed");
      return Err(GenerationError::ProcessFailed { status: output.status.to_string(), stderr });
    }
    debug!(target: "generator", stdout = %trunc_for_log(&stdout, 256), "Generator output");

    let solution = decode_payload(&stdout, kind)?;

    let svg = tokio::fs::read(&svg_path)
      .await
      .map_err(|e| GenerationError::RenderFailed(format!("cannot read {}: {e}", svg_path.display())))?;
    let png = match &self.rasterizer {
      Some(program) => {
        let png_path = svg_path.with_extension("png");
        Some(self.rasterize(program, &svg_path, &png_path, timeout).await?)
      }
      None => None,
    };

    let record = ExerciseRecord::new(solution, Diagram { svg, png });
    info!(
      target: "generator",
      %kind,
      id = %record.id(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      svg_bytes = record.diagram().svg.len(),
      "Exercise generated"
    );
    Ok(record)
  }
}

/// The generator runs inside the artifact directory, so a relative path like
/// `./circuit_generator` is pinned to the service's working directory up front.
/// Bare names (`circuit_generator`) are left for PATH lookup.
fn absolutize(program: &Path) -> PathBuf {
  if program.is_absolute() || program.components().count() < 2 {
    return program.to_path_buf();
  }
  std::env::current_dir()
    .map(|cwd| cwd.join(program))
    .unwrap_or_else(|_| program.to_path_buf())
}

async fn run_with_timeout(mut cmd: Command, stage: Stage, timeout: Duration) -> Result<Output, GenerationError> {
  cmd.kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
  let program = cmd.as_std().get_program().to_string_lossy().into_owned();
  let child = cmd.spawn().map_err(|source| GenerationError::Io { program: program.clone(), source })?;

  match tokio::time::timeout(timeout, child.wait_with_output()).await {
    Ok(Ok(output)) => Ok(output),
    Ok(Err(source)) => Err(GenerationError::Io { program, source }),
    Err(_) => {
      warn!(target: "generator", %stage, timeout_ms = timeout.as_millis() as u64, "External call timed out");
      Err(GenerationError::Timeout { stage, after: timeout })
    }
  }
}

#[derive(Deserialize)]
struct DcPayload {
  initial: f64,
  #[serde(rename = "final")]
  final_value: f64,
  tau: f64,
  #[serde(default = "default_variable")]
  variable: String,
}

#[derive(Deserialize)]
struct AcPayload {
  #[serde(default)]
  frequency: f64,
  #[serde(default)]
  omega: f64,
  #[serde(default = "default_waveform")]
  source_waveform: String,
  #[serde(default = "default_amplitude")]
  source_amplitude: f64,
  #[serde(default)]
  avg_power: serde_json::Map<String, Value>,
  #[serde(default)]
  power_factor: Option<f64>,
}

fn default_variable() -> String { "x".into() }
fn default_waveform() -> String { "sin".into() }
fn default_amplitude() -> f64 { 1.0 }

/// Decode the generator's stdout into a solution of the requested type.
pub fn decode_payload(stdout: &str, requested: ExerciseType) -> Result<Solution, GenerationError> {
  let json = extract_json_object(stdout)
    .ok_or_else(|| GenerationError::MalformedOutput("no JSON object in generator output".into()))?;
  let value: Value = serde_json::from_str(json).map_err(|e| GenerationError::MalformedOutput(e.to_string()))?;

  let declared = match value.get("exercise_type") {
    None | Some(Value::Null) => requested,
    Some(Value::String(s)) => s.parse::<ExerciseType>().map_err(|_| {
      GenerationError::MalformedOutput(format!("unknown exercise_type {s:?}"))
    })?,
    Some(other) => {
      return Err(GenerationError::MalformedOutput(format!("exercise_type is not a string: {other}")));
    }
  };
  if declared != requested {
    return Err(GenerationError::MalformedOutput(format!(
      "requested {requested} exercise but generator produced {declared}"
    )));
  }

  match requested {
    ExerciseType::Dc => {
      let p: DcPayload = serde_json::from_value(value).map_err(|e| GenerationError::MalformedOutput(e.to_string()))?;
      Ok(Solution::Dc(DcSolution { initial: p.initial, final_value: p.final_value, tau: p.tau, variable: p.variable }))
    }
    ExerciseType::Ac => {
      let p: AcPayload = serde_json::from_value(value).map_err(|e| GenerationError::MalformedOutput(e.to_string()))?;
      let avg_power = p
        .avg_power
        .into_iter()
        .map(|(component, v)| match v.as_f64() {
          Some(watts) => Ok(ComponentPower { component, watts }),
          None => Err(GenerationError::MalformedOutput(format!("avg_power.{component} is not a number"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
      Ok(Solution::Ac(AcSolution {
        frequency: p.frequency,
        omega: p.omega,
        source_waveform: p.source_waveform,
        source_amplitude: p.source_amplitude,
        avg_power,
        power_factor: p.power_factor,
      }))
    }
  }
}
