//! Blueprint Module
//!
//! The Architect's output: an exact plan of slots, one per question, plus the
//! run-wide knobs the Writer and Gatekeeper consume.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::bloom::BloomLevel;
use crate::intent::TeacherIntent;

/// Question formats a slot can demand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    MultipleChoice,
    ShortAnswer,
    FillInTheBlank,
    TrueFalse,
    Matching,
    ConstructedResponse,
    Ordering,
    Essay,
    FreeResponse,
    ArithmeticFluency,
}

impl QuestionType {
    /// Whether items of this type carry the four-option MCQ structure.
    pub fn is_multiple_choice(self) -> bool {
        matches!(self, QuestionType::MultipleChoice)
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuestionType::MultipleChoice => "multiple choice",
            QuestionType::ShortAnswer => "short answer",
            QuestionType::FillInTheBlank => "fill in the blank",
            QuestionType::TrueFalse => "true/false",
            QuestionType::Matching => "matching",
            QuestionType::ConstructedResponse => "constructed response",
            QuestionType::Ordering => "ordering",
            QuestionType::Essay => "essay",
            QuestionType::FreeResponse => "free response",
            QuestionType::ArithmeticFluency => "arithmetic fluency",
        };
        write!(f, "{}", s)
    }
}

/// Difficulty band for a single slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Challenge,
}

/// How much time pressure a slot is under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PacingBand {
    Tight,
    Normal,
    Relaxed,
}

/// How many conceptual strands an item may integrate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScopeWidth {
    Narrow,
    Focused,
    Broad,
}

/// Order the final items appear in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OrderingStrategy {
    EasyToHard,
    Interleaved,
    BloomAscending,
}

/// Operation an arithmetic-fluency slot drills.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ArithmeticOperation {
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

/// One planned question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Stable id, unique within the blueprint.
    pub id: String,
    pub question_type: QuestionType,
    pub cognitive_demand: BloomLevel,
    pub difficulty: Difficulty,
    pub pacing: PacingBand,
    #[serde(default)]
    pub requires_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<ArithmeticOperation>,
}

/// Formatting rules the Writer and Builder must obey.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattingRules {
    /// Display numbering, e.g. "arabic".
    pub numbering_style: String,
    /// MCQ option presentation, e.g. "letter-prefixed".
    pub option_style: String,
    /// Answer-key explanation verbosity, e.g. "concise".
    pub explanation_style: String,
}

impl Default for FormattingRules {
    fn default() -> Self {
        Self {
            numbering_style: "arabic".to_string(),
            option_style: "letter-prefixed".to_string(),
            explanation_style: "concise".to_string(),
        }
    }
}

/// The Architect's plan for one assessment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintPlan {
    pub slots: Vec<Slot>,
    pub scope_width: ScopeWidth,
    pub depth_floor: BloomLevel,
    pub depth_ceiling: BloomLevel,
    pub pacing_seconds_per_item: u32,
    pub ordering_strategy: OrderingStrategy,
    pub constraints: FormattingRules,
    /// The teacher intent the plan was derived from, echoed for downstream
    /// agents.
    pub uar: TeacherIntent,
}

impl BlueprintPlan {
    /// Find a slot by id.
    pub fn slot(&self, id: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    /// Structural invariants: depth band is ordered, slot ids are unique, and
    /// every slot's demand lies inside the band.
    pub fn validate(&self) -> Result<()> {
        if self.depth_floor > self.depth_ceiling {
            bail!(
                "depth floor {} exceeds ceiling {}",
                self.depth_floor,
                self.depth_ceiling
            );
        }
        let mut seen = HashSet::new();
        for slot in &self.slots {
            if !seen.insert(slot.id.as_str()) {
                bail!("duplicate slot id: {}", slot.id);
            }
            if slot.cognitive_demand < self.depth_floor
                || slot.cognitive_demand > self.depth_ceiling
            {
                bail!(
                    "slot {} demand {} outside band {}..{}",
                    slot.id,
                    slot.cognitive_demand,
                    self.depth_floor,
                    self.depth_ceiling
                );
            }
        }
        Ok(())
    }
}
