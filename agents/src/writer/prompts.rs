//! Writer Prompt Assembly
//!
//! Builds the multi-slot group prompt: grounding, Bloom scaffolding at the
//! budgeted verbosity, per-slot directives, the math-formatting contract,
//! stem-variety rules, and the strict sentinel-delimited output contract.

use examsmith_core::bloom::{self, BloomLevel, DemandTier};
use examsmith_core::blueprint::{BlueprintPlan, ScopeWidth, Slot};
use examsmith_core::intent::TeacherIntent;
use examsmith_core::parser::END_OF_PROBLEM;

use crate::hint_budget::{slot_hint_plan, HintMode};

/// Generic filler phrases the second-pass scan rejects.
pub const FORBIDDEN_FILLER_PHRASES: [&str; 5] = [
    "in general mathematics",
    "as a general rule",
    "generally speaking",
    "in the world of",
    "in many cases",
];

fn scope_width_directive(scope_width: ScopeWidth) -> &'static str {
    match scope_width {
        ScopeWidth::Narrow => "Keep every question on a single conceptual strand.",
        ScopeWidth::Focused => "Questions may connect two closely related ideas.",
        ScopeWidth::Broad => "Questions may integrate several strands from the unit.",
    }
}

fn grounding_block(intent: &TeacherIntent, scope_width: ScopeWidth) -> String {
    let mut lines = vec![
        format!("Course: {}", intent.course),
        format!("Grade level(s): {}", intent.grade_levels.join(", ")),
        format!("Unit: {}", intent.unit_name),
        format!("Topic: {}", intent.topic),
    ];
    if let Some(lesson) = &intent.lesson_name {
        lines.push(format!("Lesson: {}", lesson));
    }
    if let Some(details) = &intent.additional_details {
        lines.push(format!("Teacher notes: {}", details));
    }
    if !intent.focus_areas.is_empty() {
        lines.push(format!("Focus areas: {}", intent.focus_areas.join("; ")));
    }
    if !intent.misconceptions.is_empty() {
        lines.push(format!(
            "Target these misconceptions in the stems: {}",
            intent.misconceptions.join("; ")
        ));
    }
    if !intent.avoid_list.is_empty() {
        lines.push(format!(
            "Never use these phrases: {}",
            intent.avoid_list.join("; ")
        ));
    }
    lines.push(scope_width_directive(scope_width).to_string());
    lines.push(format!(
        "Every stem must reference the course \"{}\" and stay on the topic \"{}\".",
        intent.course, intent.topic
    ));
    lines.join("\n")
}

fn bloom_definitions() -> String {
    let mut lines = vec!["Bloom levels and their action verbs:".to_string()];
    for level in BloomLevel::ALL {
        lines.push(format!(
            "- {}: {} (verbs: {})",
            level,
            level.definition(),
            bloom::action_verbs(level).join(", ")
        ));
    }
    lines.join("\n")
}

fn example_starter(level: BloomLevel) -> String {
    let verb = bloom::action_verbs(level)
        .first()
        .copied()
        .unwrap_or("write");
    let mut starter = verb.to_string();
    if let Some(first) = starter.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    format!("{} ...", starter)
}

/// The budgeted hint directive for one slot.
pub fn slot_hint_directive(slot: &Slot, mode: HintMode) -> String {
    let tier = DemandTier::for_level(slot.cognitive_demand);
    let plan = slot_hint_plan(tier, mode);
    let mut parts = Vec::new();
    if plan.include_label {
        parts.push(format!("target Bloom level: {}", slot.cognitive_demand));
    }
    if plan.include_verbs {
        let verbs = bloom::action_verbs(slot.cognitive_demand);
        let shown: Vec<&str> = if plan.verb_count == 1 {
            verbs.iter().take(1).copied().collect()
        } else {
            verbs.iter().take(3).copied().collect()
        };
        parts.push(format!("use a verb like: {}", shown.join(", ")));
    }
    if plan.include_example_starter {
        parts.push(format!(
            "example stem opening: \"{}\"",
            example_starter(slot.cognitive_demand)
        ));
    }
    if plan.include_structure_note {
        parts.push(
            "structure: one scenario sentence, then the question itself".to_string(),
        );
    }
    parts.join("; ")
}

fn slot_block(index: usize, slot: &Slot, mode: HintMode) -> String {
    let mut lines = vec![format!(
        "Question {} (id {}): {} item, {} difficulty",
        index + 1,
        slot.id,
        slot.question_type,
        match slot.difficulty {
            examsmith_core::blueprint::Difficulty::Easy => "easy",
            examsmith_core::blueprint::Difficulty::Medium => "medium",
            examsmith_core::blueprint::Difficulty::Hard => "hard",
            examsmith_core::blueprint::Difficulty::Challenge => "challenge",
        }
    )];
    let hint = slot_hint_directive(slot, mode);
    if !hint.is_empty() {
        lines.push(format!("  {}", hint));
    }
    if slot.question_type.is_multiple_choice() {
        lines.push(
            "  Provide exactly four options prefixed \"A. \", \"B. \", \"C. \", \"D. \"; \
             the answer field must repeat the full text of the correct option."
                .to_string(),
        );
    } else {
        lines.push("  Do not provide options; give the expected answer as text.".to_string());
    }
    lines.join("\n")
}

/// Concatenated per-slot hint directives; the token-safety guard measures
/// this block.
pub fn build_hint_block(slots: &[Slot], mode: HintMode) -> String {
    slots
        .iter()
        .map(|slot| slot_hint_directive(slot, mode))
        .collect::<Vec<_>>()
        .join("\n")
}

fn math_formatting_contract() -> &'static str {
    "Math formatting: write expressions in plain text (1/3 + 1/4, y = mx + b). \
     No LaTeX, no images, no markdown."
}

fn stem_rules() -> &'static str {
    "Stem rules: vary the opening words across questions; write the way a teacher \
     speaks to students; never pad stems with generic filler such as \"in general \
     mathematics\" or \"as a general rule\"."
}

fn output_contract(count: usize) -> String {
    format!(
        "Output contract: emit exactly {} JSON objects, one per question, in the order \
         listed above. Each object has the fields slotId, questionType, prompt, options \
         (multiple choice only), answer, explanation, bloom. After each object emit the \
         line {} on its own line. No arrays, no markdown fences, no commentary.",
        count, END_OF_PROBLEM
    )
}

/// Build the full prompt for one group of slots.
pub fn build_group_prompt(
    blueprint: &BlueprintPlan,
    intent: &TeacherIntent,
    slots: &[&Slot],
    mode: HintMode,
) -> String {
    let slot_blocks = slots
        .iter()
        .enumerate()
        .map(|(i, slot)| slot_block(i, slot, mode))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are writing questions for a {} covering \"{}\".\n\n{}\n\n{}\n\n\
         Questions to write:\n{}\n\n{}\n{}\n\n{}",
        intent.assessment_type,
        intent.topic,
        grounding_block(intent, blueprint.scope_width),
        bloom_definitions(),
        slot_blocks,
        math_formatting_contract(),
        stem_rules(),
        output_contract(slots.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use examsmith_core::blueprint::{Difficulty, PacingBand, QuestionType};

    fn slot(demand: BloomLevel) -> Slot {
        Slot {
            id: "slot-01".to_string(),
            question_type: QuestionType::MultipleChoice,
            cognitive_demand: demand,
            difficulty: Difficulty::Medium,
            pacing: PacingBand::Normal,
            requires_image: false,
            operation: None,
        }
    }

    #[test]
    fn test_minimal_low_directive_is_label_only() {
        let directive = slot_hint_directive(&slot(BloomLevel::Remember), HintMode::Minimal);
        assert!(directive.contains("target Bloom level: remember"));
        assert!(!directive.contains("use a verb"));
        assert!(!directive.contains("example stem"));
    }

    #[test]
    fn test_full_high_directive_has_everything() {
        let directive = slot_hint_directive(&slot(BloomLevel::Evaluate), HintMode::Full);
        assert!(directive.contains("target Bloom level: evaluate"));
        assert!(directive.contains("use a verb like: evaluate, justify, critique"));
        assert!(directive.contains("example stem opening"));
        assert!(directive.contains("structure:"));
    }

    #[test]
    fn test_minimal_high_shows_single_verb() {
        let directive = slot_hint_directive(&slot(BloomLevel::Create), HintMode::Minimal);
        assert!(directive.contains("use a verb like: create"));
        assert!(!directive.contains("create, design"));
    }

    #[test]
    fn test_hint_block_grows_with_mode() {
        let slots: Vec<Slot> = (0..4).map(|_| slot(BloomLevel::Analyze)).collect();
        let minimal = build_hint_block(&slots, HintMode::Minimal);
        let full = build_hint_block(&slots, HintMode::Full);
        assert!(full.len() > minimal.len());
    }

    #[test]
    fn test_group_prompt_carries_contract_and_sentinel() {
        let intent: TeacherIntent = serde_json::from_value(serde_json::json!({
            "gradeLevels": ["7"],
            "course": "Pre-Algebra",
            "unitName": "Fractions",
            "topic": "adding unlike denominators",
            "studentLevel": "standard",
            "assessmentType": "quiz",
            "timeMinutes": 15,
            "avoidList": ["cross multiply"]
        }))
        .unwrap();
        let s1 = slot(BloomLevel::Apply);
        let blueprint = BlueprintPlan {
            slots: vec![s1.clone()],
            scope_width: ScopeWidth::Focused,
            depth_floor: BloomLevel::Remember,
            depth_ceiling: BloomLevel::Apply,
            pacing_seconds_per_item: 90,
            ordering_strategy: examsmith_core::blueprint::OrderingStrategy::EasyToHard,
            constraints: Default::default(),
            uar: intent.clone(),
        };
        let prompt = build_group_prompt(&blueprint, &intent, &[&s1], HintMode::Standard);
        assert!(prompt.contains(END_OF_PROBLEM));
        assert!(prompt.contains("Pre-Algebra"));
        assert!(prompt.contains("Never use these phrases: cross multiply"));
        assert!(prompt.contains("exactly 1 JSON objects"));
        assert!(prompt.contains("No arrays"));
    }
}
