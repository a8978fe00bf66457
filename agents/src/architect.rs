//! Architect Agent
//!
//! Turns a teacher intent into a blueprint: one slot per question with
//! cognitive demand, difficulty, question type, and pacing, plus the
//! run-wide scope width, depth band, ordering, and formatting rules.

use tracing::{debug, warn};

use examsmith_core::bloom::BloomLevel;
use examsmith_core::blueprint::{
    ArithmeticOperation, BlueprintPlan, Difficulty, FormattingRules, OrderingStrategy, PacingBand,
    QuestionType, ScopeWidth, Slot,
};
use examsmith_core::intent::{
    AssessmentType, BloomPreference, QuestionFormat, StudentLevel, TeacherIntent,
};

use crate::error::PipelineError;
use crate::prompt_engineer::{implied_question_count, pacing_profile};

/// Blueprint plus planner notes destined for the trace.
#[derive(Debug, Clone)]
pub struct ArchitectOutcome {
    pub plan: BlueprintPlan,
    pub notes: Vec<String>,
}

/// Published mapping from the teacher's question-format chip to concrete
/// slot question types. `Mixed` varies by assessment type.
pub fn format_question_types(
    format: QuestionFormat,
    assessment_type: AssessmentType,
) -> Vec<QuestionType> {
    match format {
        QuestionFormat::MultipleChoice => vec![QuestionType::MultipleChoice],
        QuestionFormat::ShortAnswer => vec![QuestionType::ShortAnswer],
        QuestionFormat::OpenEnded => {
            vec![QuestionType::ConstructedResponse, QuestionType::Essay]
        }
        QuestionFormat::TrueFalse => vec![QuestionType::TrueFalse],
        QuestionFormat::FillInTheBlank => vec![QuestionType::FillInTheBlank],
        QuestionFormat::Matching => vec![QuestionType::Matching],
        QuestionFormat::Mixed => match assessment_type {
            AssessmentType::Quiz | AssessmentType::Test | AssessmentType::TestReview => vec![
                QuestionType::MultipleChoice,
                QuestionType::ShortAnswer,
                QuestionType::TrueFalse,
                QuestionType::FillInTheBlank,
            ],
            AssessmentType::Worksheet => vec![
                QuestionType::ShortAnswer,
                QuestionType::FillInTheBlank,
                QuestionType::ConstructedResponse,
            ],
            AssessmentType::BellRinger | AssessmentType::ExitTicket => {
                vec![QuestionType::MultipleChoice, QuestionType::ShortAnswer]
            }
        },
    }
}

/// Default question types when the teacher picked no format. MCQ-heavy for
/// scored assessments, freer forms for practice material.
fn default_question_types(assessment_type: AssessmentType) -> Vec<QuestionType> {
    match assessment_type {
        AssessmentType::Quiz => vec![
            QuestionType::MultipleChoice,
            QuestionType::MultipleChoice,
            QuestionType::MultipleChoice,
            QuestionType::ShortAnswer,
        ],
        AssessmentType::Test => vec![
            QuestionType::MultipleChoice,
            QuestionType::MultipleChoice,
            QuestionType::ShortAnswer,
            QuestionType::TrueFalse,
            QuestionType::ConstructedResponse,
        ],
        AssessmentType::TestReview => vec![
            QuestionType::MultipleChoice,
            QuestionType::ShortAnswer,
            QuestionType::TrueFalse,
        ],
        AssessmentType::Worksheet => vec![
            QuestionType::ShortAnswer,
            QuestionType::FillInTheBlank,
            QuestionType::ConstructedResponse,
        ],
        AssessmentType::BellRinger | AssessmentType::ExitTicket => {
            vec![QuestionType::MultipleChoice, QuestionType::ShortAnswer]
        }
    }
}

/// Base Bloom weight table per student level, indexed by level rank.
fn level_weights(student_level: StudentLevel) -> [f64; 6] {
    match student_level {
        StudentLevel::Remedial => [0.40, 0.35, 0.20, 0.05, 0.0, 0.0],
        StudentLevel::Standard => [0.20, 0.30, 0.25, 0.15, 0.10, 0.0],
        StudentLevel::Honors => [0.15, 0.25, 0.30, 0.20, 0.10, 0.0],
        StudentLevel::Ap => [0.10, 0.20, 0.25, 0.25, 0.15, 0.05],
    }
}

/// Shift the base weights toward the teacher's Bloom preference.
fn apply_preference(mut weights: [f64; 6], preference: Option<BloomPreference>) -> [f64; 6] {
    match preference {
        Some(BloomPreference::Recall) => {
            for rank in 3..6 {
                let moved = weights[rank] * 0.5;
                weights[rank] -= moved;
                weights[1] += moved;
            }
        }
        Some(BloomPreference::HigherOrder) => {
            for rank in 0..2 {
                let moved = weights[rank] * 0.5;
                weights[rank] -= moved;
                weights[3] += moved;
            }
        }
        Some(BloomPreference::Balanced) | None => {}
    }
    weights
}

/// Largest-remainder allocation of `total` slots over the weight table.
fn allocate_counts(weights: [f64; 6], total: usize) -> [usize; 6] {
    let sum: f64 = weights.iter().sum();
    let mut counts = [0usize; 6];
    let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(6);
    let mut assigned = 0;
    for (rank, weight) in weights.iter().enumerate() {
        let exact = weight / sum * total as f64;
        counts[rank] = exact.floor() as usize;
        assigned += counts[rank];
        remainders.push((rank, exact - exact.floor()));
    }
    remainders.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    for (rank, _) in remainders.iter().cycle().take(total - assigned) {
        counts[*rank] += 1;
    }
    counts
}

fn difficulty_for_position(
    position: usize,
    total: usize,
    strategy: OrderingStrategy,
    student_level: StudentLevel,
) -> Difficulty {
    let allow_challenge = matches!(student_level, StudentLevel::Honors | StudentLevel::Ap);
    match strategy {
        OrderingStrategy::EasyToHard | OrderingStrategy::BloomAscending => {
            let fraction = if total <= 1 {
                0.0
            } else {
                position as f64 / (total - 1) as f64
            };
            if fraction < 0.3 {
                Difficulty::Easy
            } else if fraction < 0.6 {
                Difficulty::Medium
            } else if fraction < 0.85 || !allow_challenge {
                Difficulty::Hard
            } else {
                Difficulty::Challenge
            }
        }
        OrderingStrategy::Interleaved => {
            match position % 4 {
                0 => Difficulty::Easy,
                1 => Difficulty::Medium,
                3 => Difficulty::Medium,
                _ if allow_challenge && position + 1 == total => Difficulty::Challenge,
                _ => Difficulty::Hard,
            }
        }
    }
}

fn derive_scope_width(intent: &TeacherIntent) -> ScopeWidth {
    if intent.grade_levels.len() > 1 || intent.focus_areas.len() >= 3 {
        ScopeWidth::Broad
    } else if intent.focus_areas.len() == 1 {
        ScopeWidth::Narrow
    } else {
        ScopeWidth::Focused
    }
}

fn is_math_course(course: &str) -> bool {
    let course = course.to_lowercase();
    ["math", "algebra", "arithmetic", "geometry"]
        .iter()
        .any(|m| course.contains(m))
}

fn fluency_operations(min_grade: u32) -> &'static [ArithmeticOperation] {
    if min_grade <= 2 {
        &[ArithmeticOperation::Addition, ArithmeticOperation::Subtraction]
    } else {
        &[
            ArithmeticOperation::Addition,
            ArithmeticOperation::Subtraction,
            ArithmeticOperation::Multiplication,
            ArithmeticOperation::Division,
        ]
    }
}

/// Plan the blueprint for one run.
pub fn plan_blueprint(intent: &TeacherIntent) -> Result<ArchitectOutcome, PipelineError> {
    if intent.time_minutes == 0 {
        return Err(PipelineError::InvalidIntent {
            field: "timeMinutes".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    if intent.grade_levels.is_empty() {
        return Err(PipelineError::InvalidIntent {
            field: "gradeLevels".to_string(),
            reason: "at least one grade level is required".to_string(),
        });
    }
    if intent.topic.trim().is_empty() {
        return Err(PipelineError::InvalidIntent {
            field: "topic".to_string(),
            reason: "topic must not be empty".to_string(),
        });
    }

    let mut notes = Vec::new();
    let profile = pacing_profile(intent.assessment_type);

    let count = match intent.question_count {
        Some(requested) => {
            let clamped = requested.clamp(profile.min_q_count, profile.max_q_count);
            if clamped != requested {
                notes.push(format!(
                    "requested {} questions clamped to {} for a {}",
                    requested, clamped, intent.assessment_type
                ));
            }
            clamped
        }
        None => implied_question_count(intent).clamp(profile.min_q_count, profile.max_q_count),
    };

    // Cognitive demand distribution.
    let weights = apply_preference(level_weights(intent.student_level), intent.bloom_preference);
    let counts = allocate_counts(weights, count);
    let demanded_levels = weights.iter().filter(|w| **w > 0.0).count();
    let achieved_levels = counts.iter().filter(|c| **c > 0).count();
    if achieved_levels < demanded_levels {
        notes.push(format!(
            "bloom distribution compressed from {} to {} levels for {} slots",
            demanded_levels, achieved_levels, count
        ));
        warn!("{}", notes.last().map(String::as_str).unwrap_or_default());
    }

    let mut demands: Vec<BloomLevel> = Vec::with_capacity(count);
    for (rank, n) in counts.iter().enumerate() {
        for _ in 0..*n {
            demands.push(BloomLevel::ALL[rank]);
        }
    }
    // Ascending demand correlates with the easy-to-hard difficulty curve.
    demands.sort();

    let depth_floor = demands
        .first()
        .copied()
        .unwrap_or(BloomLevel::Remember);
    let depth_ceiling = demands
        .last()
        .copied()
        .unwrap_or(BloomLevel::Understand);

    let ordering_strategy = if intent.bloom_preference == Some(BloomPreference::HigherOrder) {
        OrderingStrategy::BloomAscending
    } else if intent.assessment_type == AssessmentType::Worksheet {
        OrderingStrategy::Interleaved
    } else {
        OrderingStrategy::EasyToHard
    };

    // Question type rotation.
    let mut types = match intent.question_format {
        Some(format) => format_question_types(format, intent.assessment_type),
        None => default_question_types(intent.assessment_type),
    };

    // Elementary math warm-ups open with local fluency drills.
    let min_grade = intent.min_grade().unwrap_or(12);
    let fluency_lead = intent.assessment_type == AssessmentType::BellRinger
        && min_grade <= 6
        && is_math_course(&intent.course)
        && intent.question_format.is_none();
    if fluency_lead {
        types.insert(0, QuestionType::ArithmeticFluency);
    }

    let pacing_seconds_per_item = (intent.time_minutes * 60 / count.max(1) as u32).max(10);
    let overall_pacing = if pacing_seconds_per_item < 45 {
        PacingBand::Tight
    } else if pacing_seconds_per_item > 120 {
        PacingBand::Relaxed
    } else {
        PacingBand::Normal
    };

    let operations = fluency_operations(min_grade);
    let mut op_cursor = 0usize;
    let slots: Vec<Slot> = (0..count)
        .map(|i| {
            let question_type = types[i % types.len()];
            let operation = if question_type == QuestionType::ArithmeticFluency {
                let op = operations[op_cursor % operations.len()];
                op_cursor += 1;
                Some(op)
            } else {
                None
            };
            Slot {
                id: format!("slot-{:02}", i + 1),
                question_type,
                cognitive_demand: if question_type == QuestionType::ArithmeticFluency {
                    // Fluency drills are recall by construction.
                    depth_floor
                } else {
                    demands[i]
                },
                difficulty: difficulty_for_position(
                    i,
                    count,
                    ordering_strategy,
                    intent.student_level,
                ),
                pacing: overall_pacing,
                requires_image: false,
                operation,
            }
        })
        .collect();

    let plan = BlueprintPlan {
        slots,
        scope_width: derive_scope_width(intent),
        depth_floor,
        depth_ceiling,
        pacing_seconds_per_item,
        ordering_strategy,
        constraints: FormattingRules::default(),
        uar: intent.clone(),
    };
    if let Err(e) = plan.validate() {
        // The construction above keeps demands inside the band; a failure
        // here is a planner bug worth surfacing in the trace, not a crash.
        notes.push(format!("blueprint failed self-validation: {}", e));
        warn!("blueprint failed self-validation: {}", e);
    }
    debug!(
        "planned {} slots ({} to {}), {}s per item",
        plan.slots.len(),
        plan.depth_floor,
        plan.depth_ceiling,
        plan.pacing_seconds_per_item
    );

    Ok(ArchitectOutcome { plan, notes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> TeacherIntent {
        serde_json::from_value(serde_json::json!({
            "gradeLevels": ["7"],
            "course": "Pre-Algebra",
            "unitName": "Fractions",
            "topic": "adding unlike denominators",
            "studentLevel": "standard",
            "assessmentType": "quiz",
            "timeMinutes": 15
        }))
        .unwrap()
    }

    #[test]
    fn test_quiz_slot_count_from_time() {
        let outcome = plan_blueprint(&intent()).unwrap();
        assert_eq!(outcome.plan.slots.len(), 10);
        assert!(outcome.plan.validate().is_ok());
    }

    #[test]
    fn test_quiz_is_mcq_heavy_by_default() {
        let outcome = plan_blueprint(&intent()).unwrap();
        let mcq = outcome
            .plan
            .slots
            .iter()
            .filter(|s| s.question_type == QuestionType::MultipleChoice)
            .count();
        assert!(mcq * 2 > outcome.plan.slots.len());
    }

    #[test]
    fn test_teacher_count_clamped_with_note() {
        let mut i = intent();
        i.question_count = Some(50);
        let outcome = plan_blueprint(&i).unwrap();
        assert_eq!(outcome.plan.slots.len(), 15);
        assert!(!outcome.notes.is_empty());
    }

    #[test]
    fn test_depth_band_holds_for_every_level() {
        for level in ["remedial", "standard", "honors", "ap"] {
            let mut i = intent();
            i.student_level = serde_json::from_value(serde_json::json!(level)).unwrap();
            let outcome = plan_blueprint(&i).unwrap();
            assert!(outcome.plan.validate().is_ok(), "level {}", level);
        }
    }

    #[test]
    fn test_higher_order_preference_raises_ordering() {
        let mut i = intent();
        i.bloom_preference = Some(BloomPreference::HigherOrder);
        let outcome = plan_blueprint(&i).unwrap();
        assert_eq!(
            outcome.plan.ordering_strategy,
            OrderingStrategy::BloomAscending
        );
    }

    #[test]
    fn test_scope_width_rules() {
        let mut i = intent();
        assert_eq!(plan_blueprint(&i).unwrap().plan.scope_width, ScopeWidth::Focused);
        i.focus_areas = vec!["one".to_string()];
        assert_eq!(plan_blueprint(&i).unwrap().plan.scope_width, ScopeWidth::Narrow);
        i.focus_areas = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(plan_blueprint(&i).unwrap().plan.scope_width, ScopeWidth::Broad);
        i.focus_areas.clear();
        i.grade_levels = vec!["7".to_string(), "8".to_string()];
        assert_eq!(plan_blueprint(&i).unwrap().plan.scope_width, ScopeWidth::Broad);
    }

    #[test]
    fn test_mixed_format_varies_by_assessment_type() {
        let quiz = format_question_types(QuestionFormat::Mixed, AssessmentType::Quiz);
        let worksheet = format_question_types(QuestionFormat::Mixed, AssessmentType::Worksheet);
        assert!(quiz.contains(&QuestionType::MultipleChoice));
        assert!(!worksheet.contains(&QuestionType::MultipleChoice));
    }

    #[test]
    fn test_elementary_math_bell_ringer_gets_fluency_lead() {
        let mut i = intent();
        i.assessment_type = AssessmentType::BellRinger;
        i.grade_levels = vec!["3".to_string()];
        i.course = "Math".to_string();
        i.time_minutes = 5;
        let outcome = plan_blueprint(&i).unwrap();
        let first = &outcome.plan.slots[0];
        assert_eq!(first.question_type, QuestionType::ArithmeticFluency);
        assert!(first.operation.is_some());
    }

    #[test]
    fn test_invalid_intent_names_field() {
        let mut i = intent();
        i.time_minutes = 0;
        match plan_blueprint(&i) {
            Err(PipelineError::InvalidIntent { field, .. }) => assert_eq!(field, "timeMinutes"),
            other => panic!("expected InvalidIntent, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_tiny_slot_count_compresses_distribution() {
        let mut i = intent();
        i.assessment_type = AssessmentType::ExitTicket;
        i.student_level = serde_json::from_value(serde_json::json!("ap")).unwrap();
        i.time_minutes = 2;
        let outcome = plan_blueprint(&i).unwrap();
        // AP demands six levels; two slots cannot cover them.
        assert_eq!(outcome.plan.slots.len(), 2);
        assert!(outcome
            .notes
            .iter()
            .any(|n| n.contains("compressed")));
    }
}
