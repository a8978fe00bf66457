//! Gatekeeper Agent
//!
//! Deterministic per-item validation against the slot and teacher intent.
//! Every rule is a pure check that emits a tagged violation on failure; the
//! first violation classifies the rewrite mode.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use examsmith_core::bloom::{self, BloomLevel};
use examsmith_core::blueprint::{Difficulty, PacingBand, ScopeWidth, Slot};
use examsmith_core::intent::TeacherIntent;
use examsmith_core::item::{
    GeneratedItem, RewriteMode, Violation, ViolationKind, OPTION_PREFIXES,
};

/// Prompt length ceiling for normal-pacing slots.
const NORMAL_PACING_MAX_PROMPT_CHARS: usize = 300;
/// Comma ceiling for narrow-scope prompts.
const NARROW_SCOPE_MAX_COMMAS: usize = 3;

/// Words too common to count as topic keywords.
const KEYWORD_STOPWORDS: [&str; 24] = [
    "the", "and", "for", "with", "that", "this", "from", "into", "are", "was", "were", "what",
    "which", "how", "their", "them", "then", "than", "will", "can", "your", "has", "have", "not",
];

/// Single-word subjects too generic to demand literal course mention.
const GENERIC_SUBJECTS: [&str; 15] = [
    "math",
    "mathematics",
    "ela",
    "english",
    "science",
    "biology",
    "chemistry",
    "physics",
    "history",
    "geography",
    "reading",
    "writing",
    "art",
    "music",
    "health",
];

/// Result of validating one item.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub ok: bool,
    /// Rewrite mode derived from the first violation, if any.
    pub mode: Option<RewriteMode>,
    pub violations: Vec<Violation>,
}

fn operator_spacing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*([=+*/−-])\s*").expect("static regex"))
}

/// Normalization applied to both prompt and topic sources before matching:
/// lowercase, whitespace runs collapsed, and spacing removed around the
/// operator characters `=`, `+`, `−`, `-`, `*`, `/`.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    operator_spacing_re()
        .replace_all(&collapsed, "$1")
        .into_owned()
}

/// Keywords of a normalized source: length >= 3, stopwords removed.
fn keywords(source: &str) -> Vec<String> {
    source
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .filter(|w| !KEYWORD_STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Whether the course name is specific enough to demand a literal mention.
fn course_is_specific(course: &str) -> bool {
    let trimmed = course.trim();
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() > 1 {
        return true;
    }
    let word = words.first().copied().unwrap_or("");
    word.len() > 8 || !GENERIC_SUBJECTS.contains(&word.to_lowercase().as_str())
}

/// Identify which option an answer points at: exact text match, or a bare
/// letter / letter-prefixed form like "B" or "B.". The flag reports whether
/// the match was exact.
pub(crate) fn match_answer_to_option<'a>(
    answer: &str,
    options: &'a [String],
) -> Option<(&'a str, bool)> {
    let trimmed = answer.trim();
    if let Some(exact) = options.iter().find(|o| o.as_str() == trimmed) {
        return Some((exact.as_str(), true));
    }
    let letter = trimmed.trim_end_matches('.').trim();
    if letter.len() == 1 {
        let upper = letter.to_ascii_uppercase();
        if let Some(by_letter) = options
            .iter()
            .find(|o| o.starts_with(&format!("{}. ", upper)))
        {
            return Some((by_letter.as_str(), false));
        }
    }
    None
}

/// Validate a single item against its slot and the teacher intent.
///
/// Pure: identical inputs always produce identical outcomes.
pub fn validate_single(
    slot: &Slot,
    item: &GeneratedItem,
    intent: &TeacherIntent,
    scope_width: ScopeWidth,
) -> GateOutcome {
    let mut violations = Vec::new();
    let violation = |kind: ViolationKind, message: String| Violation {
        slot_id: slot.id.clone(),
        kind,
        message,
    };

    // 1. Type match.
    if item.question_type != slot.question_type {
        violations.push(violation(
            ViolationKind::QuestionTypeMismatch,
            format!(
                "item is {} but the slot demands {}",
                item.question_type, slot.question_type
            ),
        ));
    }

    let prompt_norm = normalize_text(&item.prompt);

    // 2. Topic grounding, sources in priority order.
    let sources: Vec<&str> = [
        Some(intent.topic.as_str()),
        intent.lesson_name.as_deref(),
        Some(intent.unit_name.as_str()),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.trim().is_empty())
    .collect();
    let grounded = sources.iter().any(|source| {
        let source_norm = normalize_text(source);
        prompt_norm.contains(&source_norm)
            || keywords(&source_norm)
                .iter()
                .any(|k| prompt_norm.contains(k.as_str()))
    });
    if !sources.is_empty() && !grounded {
        violations.push(violation(
            ViolationKind::TopicMismatch,
            format!("prompt never references the topic \"{}\"", intent.topic),
        ));
    }

    // 3. Domain grounding for specific courses.
    if course_is_specific(&intent.course) {
        let course_norm = normalize_text(&intent.course);
        if !prompt_norm.contains(&course_norm) {
            violations.push(violation(
                ViolationKind::DomainMismatch,
                format!("prompt never mentions the course \"{}\"", intent.course),
            ));
        }
    }

    // 4/5. Option structure.
    if slot.question_type.is_multiple_choice() {
        let options_ok = item
            .options
            .as_ref()
            .map(|options| {
                options.len() == 4
                    && options
                        .iter()
                        .zip(OPTION_PREFIXES.iter())
                        .all(|(option, prefix)| option.starts_with(prefix))
            })
            .unwrap_or(false);
        if !options_ok {
            violations.push(violation(
                ViolationKind::McqOptionsInvalid,
                "multiple choice requires exactly four options prefixed A. through D.".to_string(),
            ));
        } else if let Some(options) = item.options.as_ref() {
            match match_answer_to_option(&item.answer, options) {
                Some((_, true)) => {}
                Some((full, false)) => violations.push(violation(
                    ViolationKind::McqAnswerMismatch,
                    format!(
                        "answer \"{}\" names an option by letter; it must equal \"{}\" exactly",
                        item.answer, full
                    ),
                )),
                None => violations.push(violation(
                    ViolationKind::McqAnswerMismatch,
                    format!("answer \"{}\" matches none of the options", item.answer),
                )),
            }
        }
    } else if item.has_options() {
        violations.push(violation(
            ViolationKind::McqOptionsUnexpected,
            format!("{} items must not carry options", slot.question_type),
        ));
    }

    // 6. Cognitive demand: any verb at or below the slot's level.
    let acceptable = bloom::verbs_at_or_below(slot.cognitive_demand);
    let has_verb = acceptable
        .iter()
        .any(|verb| bloom::contains_word(&item.prompt, verb));
    if !has_verb {
        let exempt = slot.cognitive_demand == BloomLevel::Remember
            && slot.question_type.is_multiple_choice()
            && !bloom::EXPLANATION_VERBS
                .iter()
                .any(|verb| bloom::contains_word(&item.prompt, verb));
        if !exempt {
            violations.push(violation(
                ViolationKind::CognitiveDemandMismatch,
                format!(
                    "prompt carries no verb at or below the {} level",
                    slot.cognitive_demand
                ),
            ));
        }
    }

    // 7. Difficulty heuristic.
    if slot.difficulty == Difficulty::Easy && bloom::contains_word(&item.prompt, "prove") {
        violations.push(violation(
            ViolationKind::DifficultyMismatch,
            "easy items must not ask for proof-level reasoning".to_string(),
        ));
    }

    // 8. Avoid list.
    let prompt_lower = item.prompt.to_lowercase();
    for phrase in &intent.avoid_list {
        if !phrase.trim().is_empty() && prompt_lower.contains(&phrase.to_lowercase()) {
            violations.push(violation(
                ViolationKind::ForbiddenContent,
                format!("prompt contains the avoided phrase \"{}\"", phrase),
            ));
        }
    }

    // 9. Misconception coverage.
    for misconception in &intent.misconceptions {
        if !misconception.trim().is_empty()
            && !prompt_lower.contains(&misconception.to_lowercase())
        {
            violations.push(violation(
                ViolationKind::MissingMisconceptionAlignment,
                format!("prompt does not target the misconception \"{}\"", misconception),
            ));
        }
    }

    // 10. Pacing.
    if slot.pacing == PacingBand::Normal && item.prompt.len() > NORMAL_PACING_MAX_PROMPT_CHARS {
        violations.push(violation(
            ViolationKind::PacingViolation,
            format!(
                "prompt length {} exceeds {} chars for normal pacing",
                item.prompt.len(),
                NORMAL_PACING_MAX_PROMPT_CHARS
            ),
        ));
    }

    // 11. Scope width.
    if scope_width == ScopeWidth::Narrow {
        let commas = item.prompt.matches(',').count();
        if commas > NARROW_SCOPE_MAX_COMMAS {
            violations.push(violation(
                ViolationKind::ScopeWidthViolation,
                format!("{} commas suggest too many strands for a narrow scope", commas),
            ));
        }
    }

    let mode = violations.first().map(|v| v.kind.rewrite_mode());
    if !violations.is_empty() {
        debug!(
            "gate: slot {} failed with {} violation(s), mode {:?}",
            slot.id,
            violations.len(),
            mode
        );
    }
    GateOutcome {
        ok: violations.is_empty(),
        mode,
        violations,
    }
}

/// The Bloom level the Gatekeeper detects in a prompt, for the alignment log.
pub fn detect_bloom(prompt: &str) -> Option<BloomLevel> {
    bloom::classify_stem(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use examsmith_core::blueprint::QuestionType;

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

    fn slot(question_type: QuestionType) -> Slot {
        Slot {
            id: "slot-01".to_string(),
            question_type,
            cognitive_demand: BloomLevel::Apply,
            difficulty: Difficulty::Medium,
            pacing: PacingBand::Normal,
            requires_image: false,
            operation: None,
        }
    }

    fn mcq_item() -> GeneratedItem {
        GeneratedItem {
            slot_id: "slot-01".to_string(),
            question_type: QuestionType::MultipleChoice,
            prompt: "In Pre-Algebra, solve 1/3 + 1/4 by adding unlike denominators.".to_string(),
            options: Some(vec![
                "A. 2/7".to_string(),
                "B. 7/12".to_string(),
                "C. 1/2".to_string(),
                "D. 2/12".to_string(),
            ]),
            answer: "B. 7/12".to_string(),
            explanation: None,
            bloom: None,
        }
    }

    #[test]
    fn test_clean_item_passes() {
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &mcq_item(),
            &intent(),
            ScopeWidth::Focused,
        );
        assert!(outcome.ok, "violations: {:?}", outcome.violations);
        assert!(outcome.mode.is_none());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let s = slot(QuestionType::MultipleChoice);
        let mut item = mcq_item();
        item.answer = "nonsense".to_string();
        let first = validate_single(&s, &item, &intent(), ScopeWidth::Focused);
        let second = validate_single(&s, &item, &intent(), ScopeWidth::Focused);
        assert_eq!(first.violations, second.violations);
        assert_eq!(first.mode, second.mode);
    }

    #[test]
    fn test_type_mismatch_maps_to_format_fix() {
        let mut item = mcq_item();
        item.question_type = QuestionType::ShortAnswer;
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &intent(),
            ScopeWidth::Focused,
        );
        assert!(!outcome.ok);
        assert_eq!(outcome.violations[0].kind, ViolationKind::QuestionTypeMismatch);
        assert_eq!(outcome.mode, Some(RewriteMode::FormatFix));
    }

    #[test]
    fn test_letter_answer_flags_mismatch() {
        // The answer "B" identifies an option but violates exact equality.
        let mut item = mcq_item();
        item.answer = "B".to_string();
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &intent(),
            ScopeWidth::Focused,
        );
        assert!(!outcome.ok);
        assert_eq!(outcome.violations[0].kind, ViolationKind::McqAnswerMismatch);
        assert_eq!(outcome.mode, Some(RewriteMode::FormatFix));
        assert!(outcome.violations[0].message.contains("B. 7/12"));
    }

    #[test]
    fn test_wrong_option_count() {
        let mut item = mcq_item();
        item.options = Some(vec!["A. 2/7".to_string(), "B. 7/12".to_string()]);
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &intent(),
            ScopeWidth::Focused,
        );
        assert_eq!(outcome.violations[0].kind, ViolationKind::McqOptionsInvalid);
    }

    #[test]
    fn test_non_mcq_rejects_options() {
        let mut item = mcq_item();
        item.question_type = QuestionType::ShortAnswer;
        let outcome = validate_single(
            &slot(QuestionType::ShortAnswer),
            &item,
            &intent(),
            ScopeWidth::Focused,
        );
        assert!(outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::McqOptionsUnexpected));
    }

    #[test]
    fn test_topic_grounding_with_operator_spacing() {
        // "y = mx + b" and "y=mx+b" normalize identically.
        let mut i = intent();
        i.topic = "y = mx + b".to_string();
        let mut item = mcq_item();
        item.prompt = "In Pre-Algebra, solve for b in y=mx+b.".to_string();
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &i,
            ScopeWidth::Focused,
        );
        assert!(
            !outcome
                .violations
                .iter()
                .any(|v| v.kind == ViolationKind::TopicMismatch),
            "violations: {:?}",
            outcome.violations
        );
    }

    #[test]
    fn test_off_topic_prompt_flagged() {
        let mut item = mcq_item();
        item.prompt = "In Pre-Algebra, solve the quadratic equation.".to_string();
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &intent(),
            ScopeWidth::Focused,
        );
        assert!(outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::TopicMismatch));
        assert_eq!(outcome.mode, Some(RewriteMode::TopicGrounding));
    }

    #[test]
    fn test_specific_course_must_appear() {
        let mut item = mcq_item();
        item.prompt = "Solve 1/3 + 1/4 by adding unlike denominators.".to_string();
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &intent(),
            ScopeWidth::Focused,
        );
        assert!(outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::DomainMismatch));

        let mut generic = intent();
        generic.course = "math".to_string();
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &generic,
            ScopeWidth::Focused,
        );
        assert!(!outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::DomainMismatch));
    }

    #[test]
    fn test_cognitive_demand_accepts_lower_verbs() {
        // An apply slot accepts a remember verb.
        let mut item = mcq_item();
        item.prompt =
            "In Pre-Algebra, identify the denominator in 1/3 + 1/4 (unlike denominators)."
                .to_string();
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &intent(),
            ScopeWidth::Focused,
        );
        assert!(!outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::CognitiveDemandMismatch));
    }

    #[test]
    fn test_remember_mcq_exemption() {
        let mut s = slot(QuestionType::MultipleChoice);
        s.cognitive_demand = BloomLevel::Remember;
        let mut item = mcq_item();
        item.prompt = "In Pre-Algebra, 1/3 + 1/4 with unlike denominators equals:".to_string();
        let outcome = validate_single(&s, &item, &intent(), ScopeWidth::Focused);
        assert!(
            !outcome
                .violations
                .iter()
                .any(|v| v.kind == ViolationKind::CognitiveDemandMismatch),
            "violations: {:?}",
            outcome.violations
        );

        // The exemption does not apply once an explanation verb appears.
        item.prompt =
            "In Pre-Algebra, why is 1/3 + 1/4 with unlike denominators not 2/7:".to_string();
        let outcome = validate_single(&s, &item, &intent(), ScopeWidth::Focused);
        assert!(outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::CognitiveDemandMismatch));
    }

    #[test]
    fn test_easy_slot_rejects_prove() {
        let mut s = slot(QuestionType::MultipleChoice);
        s.difficulty = Difficulty::Easy;
        let mut item = mcq_item();
        item.prompt =
            "In Pre-Algebra, prove the sum 1/3 + 1/4 of unlike denominators is 7/12.".to_string();
        let outcome = validate_single(&s, &item, &intent(), ScopeWidth::Focused);
        assert!(outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::DifficultyMismatch));
    }

    #[test]
    fn test_avoid_list_enforced() {
        let mut i = intent();
        i.avoid_list = vec!["common denominator".to_string()];
        let mut item = mcq_item();
        item.prompt =
            "In Pre-Algebra, solve 1/3 + 1/4 (unlike denominators) using a common denominator."
                .to_string();
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &i,
            ScopeWidth::Focused,
        );
        assert!(outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::ForbiddenContent));
    }

    #[test]
    fn test_pacing_length_limit() {
        let mut item = mcq_item();
        item.prompt = format!(
            "In Pre-Algebra, solve 1/3 + 1/4 with unlike denominators. {}",
            "Keep working through every step carefully. ".repeat(10)
        );
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &intent(),
            ScopeWidth::Focused,
        );
        assert!(outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::PacingViolation));
    }

    #[test]
    fn test_narrow_scope_comma_limit() {
        let mut item = mcq_item();
        item.prompt =
            "In Pre-Algebra, solve 1/3 + 1/4, then 1/2 + 1/5, then 1/6 + 1/7, then 1/8 + 1/9, using unlike denominators."
                .to_string();
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &item,
            &intent(),
            ScopeWidth::Narrow,
        );
        assert!(outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::ScopeWidthViolation));
    }

    #[test]
    fn test_misconception_coverage() {
        let mut i = intent();
        i.misconceptions = vec!["adding denominators directly".to_string()];
        let outcome = validate_single(
            &slot(QuestionType::MultipleChoice),
            &mcq_item(),
            &i,
            ScopeWidth::Focused,
        );
        assert!(outcome
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::MissingMisconceptionAlignment));
    }
}
