//! Pipeline Trace Module
//!
//! Every agent invocation records one step with timing and errors. The trace
//! is owned by the coordinator and emitted with the pipeline result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One agent invocation inside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub agent: String,
    /// Short summary of the step input.
    pub input: String,
    /// Short summary of the step output.
    pub output: String,
    #[serde(default)]
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// In-flight timer for a step; finish it to append to the trace.
#[derive(Debug)]
pub struct StepTimer {
    agent: String,
    input: String,
    started_at: DateTime<Utc>,
    started: std::time::Instant,
}

impl StepTimer {
    fn finish(self, output: String, errors: Vec<String>) -> TraceStep {
        TraceStep {
            agent: self.agent,
            input: self.input,
            output,
            errors,
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Full record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub run_id: Uuid,
    pub steps: Vec<TraceStep>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Run-level notes, e.g. "status=forced-complete".
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Trace {
    pub fn begin() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            steps: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            notes: Vec::new(),
        }
    }

    /// Start timing a step; pair with [`Trace::finish_step`].
    pub fn start_step(&self, agent: &str, input: impl Into<String>) -> StepTimer {
        StepTimer {
            agent: agent.to_string(),
            input: input.into(),
            started_at: Utc::now(),
            started: std::time::Instant::now(),
        }
    }

    pub fn finish_step(
        &mut self,
        timer: StepTimer,
        output: impl Into<String>,
        errors: Vec<String>,
    ) {
        self.steps.push(timer.finish(output.into(), errors));
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn close(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_lifecycle() {
        let mut trace = Trace::begin();
        let timer = trace.start_step("architect", "quiz, 15 min");
        trace.finish_step(timer, "10 slots", vec![]);
        trace.close();

        assert_eq!(trace.steps.len(), 1);
        let step = &trace.steps[0];
        assert_eq!(step.agent, "architect");
        assert!(step.errors.is_empty());
        assert!(step.finished_at >= step.started_at);
        assert!(trace.finished_at.is_some());
    }

    #[test]
    fn test_errors_recorded_without_aborting() {
        let mut trace = Trace::begin();
        let timer = trace.start_step("writer", "group of 5");
        trace.finish_step(timer, "3 items", vec!["group call failed".to_string()]);
        assert_eq!(trace.steps[0].errors.len(), 1);
    }
}
