//! Service configuration: optional TOML file plus environment overrides.
//!
//! Lookup order: built-in defaults, then the TOML file named by CIRCUIT_TUTOR_CONFIG,
//! then individual environment variables (PORT, GENERATOR_PATH, ...).

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::ExerciseType;

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
  pub server: ServerCfg,
  pub generator: GeneratorCfg,
  pub rasterizer: RasterizerCfg,
  pub session: SessionCfg,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerCfg {
  pub port: u16,
  pub static_dir: PathBuf,
}

impl Default for ServerCfg {
  fn default() -> Self {
    Self { port: 3000, static_dir: PathBuf::from("./static") }
  }
}

/// External circuit generator process.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorCfg {
  pub program: PathBuf,
  /// First positional argument: the non-interactive mode selector.
  pub mode: String,
  /// File name the generator writes its vector diagram to, relative to its working dir.
  pub diagram_file: String,
  /// Budget for each external call (generation and rasterization separately).
  pub timeout_ms: u64,
  /// Per-session working directories are created below this root.
  pub artifact_root: PathBuf,
}

impl Default for GeneratorCfg {
  fn default() -> Self {
    Self {
      program: PathBuf::from("./circuit_generator"),
      mode: "headless".into(),
      diagram_file: "circuit.svg".into(),
      timeout_ms: 5_000,
      artifact_root: std::env::temp_dir().join("circuit-tutor"),
    }
  }
}

impl GeneratorCfg {
  pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

/// SVG → PNG converter. An empty program disables rasterization.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RasterizerCfg {
  pub program: String,
}

impl Default for RasterizerCfg {
  fn default() -> Self { Self { program: "rsvg-convert".into() } }
}

impl RasterizerCfg {
  pub fn enabled(&self) -> Option<&str> {
    let p = self.program.trim();
    if p.is_empty() { None } else { Some(p) }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionCfg {
  pub default_exercise_type: ExerciseType,
  /// Oldest sessions are evicted beyond this count.
  pub max_sessions: usize,
}

impl Default for SessionCfg {
  fn default() -> Self {
    Self { default_exercise_type: ExerciseType::Dc, max_sessions: 256 }
  }
}

impl AppConfig {
  /// Defaults ← TOML file (if any) ← environment.
  pub fn from_env() -> Self {
    let mut cfg = load_config_file_from_env().unwrap_or_default();
    cfg.apply_overrides(|k| std::env::var(k).ok());
    cfg
  }

  /// Apply `KEY=value` overrides from an arbitrary lookup (the process env in production).
  pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("PORT") {
      match v.parse::<u16>() {
        Ok(port) => self.server.port = port,
        Err(_) => warn!(target: "circuit_tutor", value = %v, "Ignoring invalid PORT"),
      }
    }
    if let Some(v) = lookup("STATIC_DIR") { self.server.static_dir = PathBuf::from(v); }
    if let Some(v) = lookup("GENERATOR_PATH") { self.generator.program = PathBuf::from(v); }
    if let Some(v) = lookup("GENERATOR_MODE") { self.generator.mode = v; }
    if let Some(v) = lookup("ARTIFACT_ROOT") { self.generator.artifact_root = PathBuf::from(v); }
    if let Some(v) = lookup("EXTERNAL_TIMEOUT_MS") {
      match v.parse::<u64>() {
        Ok(ms) if ms > 0 => self.generator.timeout_ms = ms,
        _ => warn!(target: "circuit_tutor", value = %v, "Ignoring invalid EXTERNAL_TIMEOUT_MS"),
      }
    }
    if let Some(v) = lookup("RASTERIZER_PATH") { self.rasterizer.program = v; }
    if let Some(v) = lookup("DEFAULT_EXERCISE_TYPE") {
      match v.parse::<ExerciseType>() {
        Ok(t) => self.session.default_exercise_type = t,
        Err(e) => warn!(target: "circuit_tutor", error = %e, "Ignoring DEFAULT_EXERCISE_TYPE"),
      }
    }
  }
}

/// Attempt to load `AppConfig` from CIRCUIT_TUTOR_CONFIG. On any parsing/IO error, returns None.
pub fn load_config_file_from_env() -> Option<AppConfig> {
  let path = std::env::var("CIRCUIT_TUTOR_CONFIG").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "circuit_tutor", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "circuit_tutor", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "circuit_tutor", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
