//! Generated Item Module
//!
//! Items produced by the Writer, the violations the Gatekeeper raises against
//! them, and the assembled final assessment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bloom::BloomLevel;
use crate::blueprint::{Difficulty, QuestionType};

/// The four MCQ option letter prefixes, in display order.
pub const OPTION_PREFIXES: [&str; 4] = ["A. ", "B. ", "C. ", "D. "];

/// A generated question bound to a slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedItem {
    /// Must equal the id of the slot the item fills.
    pub slot_id: String,
    /// Must equal the slot's question type.
    pub question_type: QuestionType,
    /// The question stem shown to students.
    pub prompt: String,
    /// MCQ only: exactly four strings prefixed "A. ".."D. ".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// For MCQ, equals one of `options` verbatim; otherwise free text.
    #[serde(default)]
    pub answer: String,
    /// Optional answer-key explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Bloom level the writer claims for the stem, when echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloom: Option<BloomLevel>,
}

impl GeneratedItem {
    /// Whether the item carries a non-empty options array.
    pub fn has_options(&self) -> bool {
        self.options.as_ref().map(|o| !o.is_empty()).unwrap_or(false)
    }
}

/// Closed set of Gatekeeper violation tags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    QuestionTypeMismatch,
    TopicMismatch,
    DomainMismatch,
    McqOptionsInvalid,
    McqAnswerMismatch,
    McqOptionsUnexpected,
    CognitiveDemandMismatch,
    DifficultyMismatch,
    ForbiddenContent,
    MissingMisconceptionAlignment,
    PacingViolation,
    ScopeWidthViolation,
}

/// A single Gatekeeper finding against one item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub slot_id: String,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub message: String,
}

/// Classified kind of surgical fix requested from the Rewriter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RewriteMode {
    FormatFix,
    DistractorStrengthen,
    ClarityFix,
    CognitiveAdjust,
    DifficultyAdjust,
    TopicGrounding,
}

impl ViolationKind {
    /// Map a violation tag to the rewrite mode that repairs it.
    pub fn rewrite_mode(self) -> RewriteMode {
        match self {
            ViolationKind::McqOptionsInvalid
            | ViolationKind::McqAnswerMismatch
            | ViolationKind::McqOptionsUnexpected
            | ViolationKind::QuestionTypeMismatch => RewriteMode::FormatFix,
            ViolationKind::TopicMismatch | ViolationKind::DomainMismatch => {
                RewriteMode::TopicGrounding
            }
            ViolationKind::CognitiveDemandMismatch => RewriteMode::CognitiveAdjust,
            ViolationKind::DifficultyMismatch => RewriteMode::DifficultyAdjust,
            ViolationKind::ForbiddenContent
            | ViolationKind::MissingMisconceptionAlignment
            | ViolationKind::PacingViolation
            | ViolationKind::ScopeWidthViolation => RewriteMode::ClarityFix,
        }
    }
}

/// Per-run Writer counters surfaced in the pipeline result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriterTelemetry {
    /// Item count of each LLM batch, in dispatch order.
    pub chunk_sizes: Vec<usize>,
    pub truncation_events: u32,
    pub gatekeeper_violations: u32,
    pub rewrite_count: u32,
    pub final_problem_count: usize,
}

/// Whether the detected Bloom level sat above, below, or on the slot intent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlignmentDirection {
    Aligned,
    Above,
    Below,
    Undetected,
}

/// One row of the post-gate Bloom alignment log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BloomAlignmentRecord {
    pub slot_id: String,
    pub writer_bloom: BloomLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gatekeeper_bloom: Option<BloomLevel>,
    pub aligned: bool,
    pub direction: AlignmentDirection,
}

/// Alignment rows in blueprint slot order.
pub type BloomAlignmentLog = Vec<BloomAlignmentRecord>;

/// Fraction of rows where the detected level disagreed with the slot intent.
pub fn drift_rate(log: &BloomAlignmentLog) -> f64 {
    if log.is_empty() {
        return 0.0;
    }
    let misaligned = log.iter().filter(|r| !r.aligned).count();
    misaligned as f64 / log.len() as f64
}

/// Metadata carried on each final assessment item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub slot_id: String,
    pub question_type: QuestionType,
    pub cognitive_demand: BloomLevel,
    pub difficulty: Difficulty,
}

/// One numbered question in the final assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentItem {
    pub item_number: usize,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub answer_key: String,
    pub metadata: ItemMetadata,
}

/// The vetted, numbered assessment the Builder emits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalAssessment {
    pub title: String,
    pub items: Vec<AssessmentItem>,
    pub total_items: usize,
    /// Achieved Bloom counts over the emitted items.
    pub cognitive_distribution: BTreeMap<BloomLevel, usize>,
    pub metadata: AssessmentMetadata,
}

/// Run-level metadata on the final assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentMetadata {
    pub course: String,
    pub unit_name: String,
    pub topic: String,
    pub assessment_type: String,
    pub time_minutes: u32,
    /// Set when the run was emitted after cycle or deadline exhaustion.
    #[serde(default)]
    pub forced_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_tag_wire_names() {
        let v = Violation {
            slot_id: "s1".to_string(),
            kind: ViolationKind::McqAnswerMismatch,
            message: "answer does not match an option".to_string(),
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "mcq_answer_mismatch");
        assert_eq!(
            serde_json::to_value(ViolationKind::QuestionTypeMismatch).unwrap(),
            "question_type_mismatch"
        );
        assert_eq!(
            serde_json::to_value(ViolationKind::ScopeWidthViolation).unwrap(),
            "scope_width_violation"
        );
    }

    #[test]
    fn test_rewrite_mode_mapping() {
        assert_eq!(
            ViolationKind::McqOptionsInvalid.rewrite_mode(),
            RewriteMode::FormatFix
        );
        assert_eq!(
            ViolationKind::QuestionTypeMismatch.rewrite_mode(),
            RewriteMode::FormatFix
        );
        assert_eq!(
            ViolationKind::TopicMismatch.rewrite_mode(),
            RewriteMode::TopicGrounding
        );
        assert_eq!(
            ViolationKind::CognitiveDemandMismatch.rewrite_mode(),
            RewriteMode::CognitiveAdjust
        );
        assert_eq!(
            ViolationKind::DifficultyMismatch.rewrite_mode(),
            RewriteMode::DifficultyAdjust
        );
        assert_eq!(
            ViolationKind::PacingViolation.rewrite_mode(),
            RewriteMode::ClarityFix
        );
    }

    #[test]
    fn test_drift_rate() {
        let row = |aligned| BloomAlignmentRecord {
            slot_id: "s".to_string(),
            writer_bloom: BloomLevel::Apply,
            gatekeeper_bloom: Some(BloomLevel::Apply),
            aligned,
            direction: AlignmentDirection::Aligned,
        };
        assert_eq!(drift_rate(&vec![]), 0.0);
        assert_eq!(drift_rate(&vec![row(true), row(false)]), 0.5);
        assert_eq!(drift_rate(&vec![row(false), row(false)]), 1.0);
    }

    #[test]
    fn test_cognitive_distribution_serializes_with_level_keys() {
        let mut dist = BTreeMap::new();
        dist.insert(BloomLevel::Remember, 4usize);
        dist.insert(BloomLevel::Apply, 6usize);
        let json = serde_json::to_value(&dist).unwrap();
        assert_eq!(json["remember"], 4);
        assert_eq!(json["apply"], 6);
    }
}
