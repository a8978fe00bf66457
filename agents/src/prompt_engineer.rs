//! Prompt-Engineer Agent
//!
//! Deterministic pre-validator for teacher intents: flags contradictions the
//! teacher should resolve before any LLM call is made, notes missing
//! information, and estimates both student time and pipeline creation time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use examsmith_core::intent::{
    AssessmentType, SectionStructure, StandardsAlignment, StudentLevel, TeacherIntent,
};

/// Base seconds of pipeline overhead in the creation-time estimate.
pub const CREATION_BASE_SECONDS: f64 = 12.0;
/// Writer seconds budgeted per question.
pub const WRITER_SEC_PER_Q: f64 = 1.8;
/// Penalty seconds per 500 characters of teacher-supplied input.
pub const INPUT_PENALTY_PER_500_CHARS: f64 = 0.6;

/// Topics too vague to ground questions on.
const SENTINEL_TOPICS: [&str; 5] = ["stuff", "misc", "review", "things", "general"];

/// Course-name markers too advanced for elementary grades.
const ADVANCED_COURSE_MARKERS: [&str; 3] = ["calculus", "physics", "chemistry"];

/// Pacing constants for one assessment type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingProfile {
    /// Average minutes a student spends per question.
    pub avg_min_per_q: f64,
    pub min_q_count: usize,
    pub max_q_count: usize,
}

/// Published pacing table, per assessment type.
pub fn pacing_profile(assessment_type: AssessmentType) -> PacingProfile {
    match assessment_type {
        AssessmentType::BellRinger => PacingProfile {
            avg_min_per_q: 1.0,
            min_q_count: 2,
            max_q_count: 6,
        },
        AssessmentType::ExitTicket => PacingProfile {
            avg_min_per_q: 1.0,
            min_q_count: 2,
            max_q_count: 5,
        },
        AssessmentType::Quiz => PacingProfile {
            avg_min_per_q: 1.5,
            min_q_count: 5,
            max_q_count: 15,
        },
        AssessmentType::Test => PacingProfile {
            avg_min_per_q: 2.0,
            min_q_count: 10,
            max_q_count: 40,
        },
        AssessmentType::Worksheet => PacingProfile {
            avg_min_per_q: 2.0,
            min_q_count: 5,
            max_q_count: 25,
        },
        AssessmentType::TestReview => PacingProfile {
            avg_min_per_q: 1.5,
            min_q_count: 8,
            max_q_count: 30,
        },
    }
}

/// Creation-time complexity multiplier per assessment type (0.7 to 1.35).
pub fn type_complexity(assessment_type: AssessmentType) -> f64 {
    match assessment_type {
        AssessmentType::BellRinger => 0.7,
        AssessmentType::ExitTicket => 0.75,
        AssessmentType::Quiz => 1.0,
        AssessmentType::Worksheet => 1.1,
        AssessmentType::TestReview => 1.2,
        AssessmentType::Test => 1.35,
    }
}

/// Question count implied by the time budget at the type's pacing.
pub fn implied_question_count(intent: &TeacherIntent) -> usize {
    let profile = pacing_profile(intent.assessment_type);
    let implied = (intent.time_minutes as f64 / profile.avg_min_per_q).round() as usize;
    implied.max(1)
}

/// Report returned by the pre-validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptEngineerReport {
    /// Teacher-facing one-line contradiction messages; non-empty blocks.
    pub contradictions: Vec<String>,
    pub missing_info: Vec<String>,
    /// Estimated student-facing duration of the assessment.
    pub estimated_time_minutes: u32,
    /// Estimated wall-clock seconds to generate the assessment.
    pub estimated_creation_seconds: u32,
    pub suggestions: Vec<String>,
    pub should_block: bool,
}

/// Run the deterministic intent sanity check. Makes no LLM calls and runs in
/// time proportional to the input size.
pub fn run_prompt_engineer(intent: &TeacherIntent) -> PromptEngineerReport {
    let profile = pacing_profile(intent.assessment_type);
    let implied_q = implied_question_count(intent);

    let missing_info = collect_missing_info(intent);
    let contradictions = collect_contradictions(intent, &profile, implied_q);
    let suggestions = collect_suggestions(intent);

    let estimated_time_minutes =
        (implied_q as f64 * profile.avg_min_per_q).round().max(1.0) as u32;

    let input_penalty = (intent.input_length() as f64 / 500.0) * INPUT_PENALTY_PER_500_CHARS;
    let estimated_creation_seconds = ((CREATION_BASE_SECONDS
        + implied_q as f64 * WRITER_SEC_PER_Q
        + input_penalty)
        * type_complexity(intent.assessment_type))
    .round() as u32;

    let should_block = !contradictions.is_empty();
    debug!(
        "prompt engineer: {} contradictions, {} missing, ~{}s creation",
        contradictions.len(),
        missing_info.len(),
        estimated_creation_seconds
    );

    PromptEngineerReport {
        contradictions,
        missing_info,
        estimated_time_minutes,
        estimated_creation_seconds,
        suggestions,
        should_block,
    }
}

fn collect_missing_info(intent: &TeacherIntent) -> Vec<String> {
    let mut missing = Vec::new();
    if intent.course.trim().len() < 2 {
        missing.push("course name is missing or too short".to_string());
    }
    let topic = intent.topic.trim().to_lowercase();
    if topic.len() < 3 || SENTINEL_TOPICS.contains(&topic.as_str()) {
        missing.push("topic is missing or too vague to write questions about".to_string());
    }
    if intent.grade_levels.is_empty() {
        missing.push("at least one grade level is required".to_string());
    }
    if intent.time_minutes == 0 {
        missing.push("time budget must be greater than zero".to_string());
    }
    missing
}

fn collect_contradictions(
    intent: &TeacherIntent,
    profile: &PacingProfile,
    implied_q: usize,
) -> Vec<String> {
    let mut found = Vec::new();

    let is_long_form = matches!(
        intent.assessment_type,
        AssessmentType::Test | AssessmentType::Worksheet
    );
    if intent.time_minutes < 10 && is_long_form {
        found.push(format!(
            "A {} needs at least 15 minutes of class time; {} minutes is not enough.",
            intent.assessment_type, intent.time_minutes
        ));
    }

    let is_warmup = matches!(
        intent.assessment_type,
        AssessmentType::BellRinger | AssessmentType::ExitTicket
    );
    if intent.time_minutes > 15 && is_warmup {
        found.push(format!(
            "A {} should take 15 minutes or less; consider a quiz for a {}-minute block.",
            intent.assessment_type, intent.time_minutes
        ));
    }

    if implied_q as f64 > profile.max_q_count as f64 * 1.5 {
        found.push(format!(
            "The time budget implies about {} questions, far past the {} a {} supports.",
            implied_q, profile.max_q_count, intent.assessment_type
        ));
    }

    if intent.student_level == StudentLevel::Remedial
        && intent.assessment_type == AssessmentType::Test
        && intent.time_minutes < 20
    {
        found.push(
            "Remedial students need at least 20 minutes for a full test; shorten it to a quiz or extend the time."
                .to_string(),
        );
    }

    if intent.section_structure == Some(SectionStructure::Multiple) && intent.time_minutes < 15 {
        found.push(
            "Multiple sections need at least 15 minutes; use a single section for a short block."
                .to_string(),
        );
    }

    if intent.standards_alignment == Some(StandardsAlignment::Ap)
        && intent.student_level != StudentLevel::Ap
    {
        found.push(format!(
            "AP standards alignment requires an AP class; this class is marked {}.",
            intent.student_level
        ));
    }

    if let Some(min_grade) = intent.min_grade() {
        let course = intent.course.to_lowercase();
        let advanced = course.split_whitespace().next() == Some("ap")
            || ADVANCED_COURSE_MARKERS
                .iter()
                .any(|marker| course.contains(marker));
        if min_grade <= 5 && advanced {
            found.push(format!(
                "Grade {} is too early for \"{}\"; double-check the grade levels or the course.",
                min_grade, intent.course
            ));
        }
    }

    found
}

fn collect_suggestions(intent: &TeacherIntent) -> Vec<String> {
    let mut suggestions = Vec::new();
    if intent.focus_areas.is_empty() {
        suggestions
            .push("Adding one or two focus areas sharpens the questions noticeably.".to_string());
    }
    if intent.misconceptions.is_empty() {
        suggestions.push(
            "Listing common misconceptions lets the generator target them with distractors."
                .to_string(),
        );
    }
    if intent.source_documents.is_empty() && intent.additional_details.is_none() {
        suggestions.push(
            "Attach lesson material or notes so questions match what was actually taught."
                .to_string(),
        );
    }
    suggestions
}
