//! Philosopher Agent
//!
//! Judges a writer draft: complete, or in need of surgical rewrites, with a
//! severity score and per-culprit instructions. LLM-backed; a deterministic
//! fallback derived from gate residue and telemetry covers transport or
//! parse failures so the pipeline never stalls on the judge.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use examsmith_core::blueprint::BlueprintPlan;
use examsmith_core::config::PipelineConfig;
use examsmith_core::llm_transport::{LlmRequest, LlmTransport};
use examsmith_core::parser;

use crate::astronomer::AstronomerReport;
use crate::writer::WriterOutput;

/// Evaluation mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PhilosopherMode {
    /// First-pass review of the fresh draft.
    Write,
    /// Review informed by the Astronomer's predicted-performance report.
    Playtest,
    /// Side-by-side review of a draft against a prior version.
    Compare,
}

impl std::fmt::Display for PhilosopherMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PhilosopherMode::Write => "write",
            PhilosopherMode::Playtest => "playtest",
            PhilosopherMode::Compare => "compare",
        };
        write!(f, "{}", s)
    }
}

/// Overall verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PhilosopherStatus {
    Complete,
    Rewrite,
}

/// One culprit and how to fix it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteInstruction {
    pub problem_id: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub instructions: String,
}

/// The Philosopher's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhilosopherReport {
    pub status: PhilosopherStatus,
    /// 0 (pristine) to 10 (unusable).
    pub severity: u8,
    #[serde(default)]
    pub culprit_problems: Vec<String>,
    #[serde(default)]
    pub rewrite_instructions: Vec<RewriteInstruction>,
    #[serde(default)]
    pub narrative_summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// LLM-backed draft judge.
pub struct Philosopher {
    transport: Arc<dyn LlmTransport>,
    model: String,
    temperature: f64,
}

impl Philosopher {
    pub fn new(transport: Arc<dyn LlmTransport>, config: &PipelineConfig) -> Self {
        Self {
            transport,
            model: config.provider.model.clone(),
            temperature: config.roles.analysis_temperature,
        }
    }

    /// Evaluate a draft. Never fails; on transport or parse trouble the
    /// deterministic fallback verdict is returned.
    pub async fn evaluate(
        &self,
        mode: PhilosopherMode,
        blueprint: &BlueprintPlan,
        draft: &WriterOutput,
        astronomer: Option<&AstronomerReport>,
    ) -> PhilosopherReport {
        let prompt = self.build_prompt(mode, blueprint, draft, astronomer);
        let request = LlmRequest {
            model: self.model.clone(),
            prompt,
            temperature: self.temperature,
            max_output_tokens: 2048,
            request_id: None,
        };
        match self.transport.call_one(request).await {
            Ok(raw) => match self.parse_report(&raw) {
                Some(report) => report,
                None => {
                    warn!("philosopher response unparseable, using fallback verdict");
                    fallback_verdict(blueprint, draft, astronomer)
                }
            },
            Err(e) => {
                warn!("philosopher call failed ({}), using fallback verdict", e);
                fallback_verdict(blueprint, draft, astronomer)
            }
        }
    }

    fn build_prompt(
        &self,
        mode: PhilosopherMode,
        blueprint: &BlueprintPlan,
        draft: &WriterOutput,
        astronomer: Option<&AstronomerReport>,
    ) -> String {
        let items_json = serde_json::to_string_pretty(&draft.items).unwrap_or_default();
        let residue = if draft.residual_violations.is_empty() {
            "none".to_string()
        } else {
            draft
                .residual_violations
                .iter()
                .map(|v| format!("- {}: {}", v.slot_id, v.message))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let analytics = astronomer
            .map(|report| {
                format!(
                    "Predicted average score {:.2}, fatigue risk {:.2}, confusion risk {:.2}.",
                    report.predicted_average_score, report.fatigue_risk, report.confusion_risk
                )
            })
            .unwrap_or_else(|| "No predicted-performance data yet.".to_string());
        format!(
            "You are reviewing a draft {} for \"{}\" ({} mode review).\n\n\
             Planned: {} questions, Bloom band {} to {}.\n\
             Delivered items JSON:\n{}\n\n\
             Unresolved validation findings:\n{}\n\n{}\n\n\
             Judge the draft. Return a single JSON object with fields: status \
             (\"complete\" or \"rewrite\"), severity (integer 0-10), culpritProblems \
             (array of slot ids), rewriteInstructions (array of {{problemId, issues, \
             instructions}}), narrativeSummary, keyFindings, recommendations. \
             No markdown fences.",
            blueprint.uar.assessment_type,
            blueprint.uar.topic,
            mode,
            blueprint.slots.len(),
            blueprint.depth_floor,
            blueprint.depth_ceiling,
            items_json,
            residue,
            analytics,
        )
    }

    fn parse_report(&self, raw: &str) -> Option<PhilosopherReport> {
        let value = parser::parse_item_block(raw).ok()?;
        let mut report: PhilosopherReport = serde_json::from_value(value).ok()?;
        report.severity = report.severity.min(10);
        debug!(
            "philosopher verdict: {:?} severity {}",
            report.status, report.severity
        );
        Some(report)
    }
}

/// Deterministic verdict from gate residue, missing slots, and analytics.
pub fn fallback_verdict(
    blueprint: &BlueprintPlan,
    draft: &WriterOutput,
    astronomer: Option<&AstronomerReport>,
) -> PhilosopherReport {
    let missing = blueprint.slots.len().saturating_sub(draft.items.len());
    let residue = draft.residual_violations.len();
    let fatigue_penalty = astronomer
        .map(|report| if report.fatigue_risk > 0.7 { 1 } else { 0 })
        .unwrap_or(0);
    let severity = ((missing * 3 + residue * 2 + fatigue_penalty) as u8).min(10);
    let status = if severity <= 2 {
        PhilosopherStatus::Complete
    } else {
        PhilosopherStatus::Rewrite
    };

    let mut culprits: Vec<String> = draft
        .residual_violations
        .iter()
        .map(|v| v.slot_id.clone())
        .collect();
    culprits.dedup();

    let rewrite_instructions = culprits
        .iter()
        .map(|slot_id| RewriteInstruction {
            problem_id: slot_id.clone(),
            issues: draft
                .residual_violations
                .iter()
                .filter(|v| &v.slot_id == slot_id)
                .map(|v| v.message.clone())
                .collect(),
            instructions: "Resolve the listed findings without changing the question's intent."
                .to_string(),
        })
        .collect();

    PhilosopherReport {
        status,
        severity,
        culprit_problems: culprits,
        rewrite_instructions,
        narrative_summary: format!(
            "{} of {} planned items delivered with {} unresolved finding(s).",
            draft.items.len(),
            blueprint.slots.len(),
            residue
        ),
        key_findings: Vec::new(),
        recommendations: Vec::new(),
    }
}
