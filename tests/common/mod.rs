// tests/common/mod.rs

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use circuit_tutor::domain::{
    AcSolution, ComponentPower, DcSolution, Diagram, ExerciseRecord, ExerciseType, Solution,
};
use circuit_tutor::generator::{ExerciseGenerator, GenerationError};

/// In-memory generator: every call yields a distinct exercise of the requested type.
/// DC call `n` has `initial = n` and variable `v<n>`; AC exercises carry powers
/// `{R1: 3.2, R2: 1.1}` and no power factor. Queued failures are returned first.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: AtomicUsize,
    failures: Mutex<VecDeque<GenerationError>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, e: GenerationError) {
        self.failures.lock().unwrap().push_back(e);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExerciseGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        kind: ExerciseType,
        _artifact_dir: &Path,
        _timeout: Duration,
    ) -> Result<ExerciseRecord, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        let solution = match kind {
            ExerciseType::Dc => Solution::Dc(DcSolution {
                initial: n as f64,
                final_value: 10.0,
                tau: 0.5,
                variable: format!("v{n}"),
            }),
            ExerciseType::Ac => Solution::Ac(AcSolution {
                frequency: 50.0,
                omega: 314.159,
                source_waveform: "sin".into(),
                source_amplitude: 2.0,
                avg_power: vec![
                    ComponentPower { component: "R1".into(), watts: 3.2 },
                    ComponentPower { component: "R2".into(), watts: 1.1 },
                ],
                power_factor: None,
            }),
        };
        Ok(ExerciseRecord::new(
            solution,
            Diagram { svg: format!("<svg id=\"{n}\"/>").into_bytes(), png: None },
        ))
    }
}

pub fn malformed() -> GenerationError {
    GenerationError::MalformedOutput("no JSON object in generator output".into())
}
