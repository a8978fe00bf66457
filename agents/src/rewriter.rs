//! Surgical Rewriter Agent
//!
//! Fixes a single item according to a classified rewrite mode. Identity
//! fields are forcibly preserved: the output always carries the original
//! slot id and question type, and a failed parse returns the original item
//! unchanged so the Gatekeeper catches it on the second pass.

use std::sync::Arc;
use tracing::{debug, warn};

use examsmith_core::config::PipelineConfig;
use examsmith_core::item::{GeneratedItem, RewriteMode, Violation};
use examsmith_core::llm_transport::{LlmRequest, LlmTransport};
use examsmith_core::parser;

use crate::gatekeeper::match_answer_to_option;

/// Mode-conditioned instruction, preserved verbatim in the rewrite prompt.
pub fn mode_instruction(mode: RewriteMode) -> &'static str {
    match mode {
        RewriteMode::FormatFix => {
            "Fix structural formatting only. Enforce exactly four options prefixed A. through D. \
             and set the answer to the full text of the correct option."
        }
        RewriteMode::DistractorStrengthen => {
            "Replace weak distractors with plausible alternatives. Preserve the format."
        }
        RewriteMode::ClarityFix => {
            "Rephrase for clarity and shorten sentences. Do not alter the options or the answer."
        }
        RewriteMode::CognitiveAdjust => {
            "Rewrite the stem to use verbs matching the required Bloom level. Preserve the \
             options and answer unless the change forces otherwise."
        }
        RewriteMode::DifficultyAdjust => {
            "Remove proof-level reasoning for easy items; raise rigor for challenge items. \
             Preserve the option format."
        }
        RewriteMode::TopicGrounding => {
            "Explicitly reference the required topic and course in the stem. Preserve the \
             options and answer."
        }
    }
}

/// LLM-backed single-item fixer.
pub struct SurgicalRewriter {
    transport: Arc<dyn LlmTransport>,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl SurgicalRewriter {
    pub fn new(transport: Arc<dyn LlmTransport>, config: &PipelineConfig) -> Self {
        Self {
            transport,
            model: config.provider.model.clone(),
            temperature: config.roles.rewriter_temperature,
            max_output_tokens: 2048,
        }
    }

    /// Rewrite one item under the given mode. Never fails: any transport or
    /// parse error falls back to the original item.
    pub async fn rewrite_single(
        &self,
        item: &GeneratedItem,
        violations: &[Violation],
        mode: RewriteMode,
    ) -> GeneratedItem {
        // A letter-only answer has a deterministic fix; no model call needed.
        if mode == RewriteMode::FormatFix {
            if let Some(options) = item.options.as_deref() {
                if let Some((full, false)) = match_answer_to_option(&item.answer, options) {
                    debug!("slot {}: expanded letter answer locally", item.slot_id);
                    let mut fixed = item.clone();
                    fixed.answer = full.to_string();
                    return fixed;
                }
            }
        }

        let prompt = self.build_prompt(item, violations, mode);
        let request = LlmRequest {
            model: self.model.clone(),
            prompt,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            request_id: None,
        };

        let raw = match self.transport.call_one(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("slot {}: rewrite call failed: {}", item.slot_id, e);
                return item.clone();
            }
        };

        self.adopt_rewrite(item, &raw)
    }

    /// Rewrite one culprit item following Philosopher instructions.
    pub async fn rewrite_with_instructions(
        &self,
        item: &GeneratedItem,
        issues: &[String],
        instructions: &str,
    ) -> GeneratedItem {
        let prompt = format!(
            "You are revising one question of a classroom assessment.\n\n\
             Current item JSON:\n{}\n\n\
             Issues found during review:\n{}\n\n\
             Revision instructions: {}\n\n\
             Return the corrected item as a single JSON object with the same fields. \
             No markdown fences, no commentary.",
            serde_json::to_string_pretty(item).unwrap_or_default(),
            issues
                .iter()
                .map(|i| format!("- {}", i))
                .collect::<Vec<_>>()
                .join("\n"),
            instructions,
        );
        let request = LlmRequest {
            model: self.model.clone(),
            prompt,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            request_id: None,
        };
        match self.transport.call_one(request).await {
            Ok(raw) => self.adopt_rewrite(item, &raw),
            Err(e) => {
                warn!("slot {}: instruction rewrite failed: {}", item.slot_id, e);
                item.clone()
            }
        }
    }

    fn build_prompt(
        &self,
        item: &GeneratedItem,
        violations: &[Violation],
        mode: RewriteMode,
    ) -> String {
        let violation_lines = violations
            .iter()
            .map(|v| format!("- {}", v.message))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "You are surgically fixing one question of a classroom assessment.\n\n\
             Current item JSON:\n{}\n\n\
             Validation failures:\n{}\n\n\
             Fix directive: {}\n\n\
             Return ONLY the corrected item as a single JSON object with the fields \
             slotId, questionType, prompt, options (multiple choice only), answer, \
             and explanation. No markdown fences, no commentary, no arrays.",
            serde_json::to_string_pretty(item).unwrap_or_default(),
            violation_lines,
            mode_instruction(mode),
        )
    }

    /// Parse a rewrite response, forcing identity fields; fall back to the
    /// original on any defect.
    fn adopt_rewrite(&self, original: &GeneratedItem, raw: &str) -> GeneratedItem {
        let value = match parser::parse_item_block(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "slot {}: rewrite response unparseable, keeping original: {}",
                    original.slot_id, e
                );
                return original.clone();
            }
        };
        match serde_json::from_value::<GeneratedItem>(value) {
            Ok(mut rewritten) => {
                rewritten.slot_id = original.slot_id.clone();
                rewritten.question_type = original.question_type;
                rewritten
            }
            Err(e) => {
                warn!(
                    "slot {}: rewrite response malformed, keeping original: {}",
                    original.slot_id, e
                );
                original.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use examsmith_core::blueprint::QuestionType;
    use examsmith_core::item::ViolationKind;

    struct ScriptedTransport {
        response: String,
    }

    #[async_trait]
    impl LlmTransport for ScriptedTransport {
        async fn call_one(&self, _request: LlmRequest) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl LlmTransport for FailingTransport {
        async fn call_one(&self, _request: LlmRequest) -> Result<String> {
            Err(anyhow::anyhow!("network down"))
        }
    }

    fn item() -> GeneratedItem {
        GeneratedItem {
            slot_id: "slot-03".to_string(),
            question_type: QuestionType::MultipleChoice,
            prompt: "Solve 1/3 + 1/4.".to_string(),
            options: Some(vec![
                "A. 2/7".to_string(),
                "B. Find a common denominator".to_string(),
                "C. 1/2".to_string(),
                "D. 2/12".to_string(),
            ]),
            answer: "B".to_string(),
            explanation: None,
            bloom: None,
        }
    }

    fn violation() -> Violation {
        Violation {
            slot_id: "slot-03".to_string(),
            kind: ViolationKind::McqAnswerMismatch,
            message: "answer names an option by letter".to_string(),
        }
    }

    fn rewriter(transport: Arc<dyn LlmTransport>) -> SurgicalRewriter {
        SurgicalRewriter::new(transport, &PipelineConfig::default())
    }

    #[tokio::test]
    async fn test_letter_answer_expanded_without_llm() {
        // FailingTransport proves no model call happens on this path.
        let rewriter = rewriter(Arc::new(FailingTransport));
        let fixed = rewriter
            .rewrite_single(&item(), &[violation()], RewriteMode::FormatFix)
            .await;
        assert_eq!(fixed.answer, "B. Find a common denominator");
        assert_eq!(fixed.slot_id, "slot-03");
    }

    #[tokio::test]
    async fn test_identity_fields_forced_on_rewrite() {
        let response = serde_json::json!({
            "slotId": "slot-99",
            "questionType": "shortAnswer",
            "prompt": "Rewritten stem about adding unlike denominators.",
            "options": ["A. 2/7", "B. 7/12", "C. 1/2", "D. 2/12"],
            "answer": "B. 7/12"
        })
        .to_string();
        let rewriter = rewriter(Arc::new(ScriptedTransport { response }));
        let mut original = item();
        original.answer = "nonsense".to_string();
        let fixed = rewriter
            .rewrite_single(&original, &[violation()], RewriteMode::FormatFix)
            .await;
        assert_eq!(fixed.slot_id, "slot-03");
        assert_eq!(fixed.question_type, QuestionType::MultipleChoice);
        assert_eq!(fixed.answer, "B. 7/12");
    }

    #[tokio::test]
    async fn test_parse_failure_returns_original() {
        let rewriter = rewriter(Arc::new(ScriptedTransport {
            response: "sorry, I cannot help with that".to_string(),
        }));
        let mut original = item();
        original.answer = "nonsense".to_string();
        let fixed = rewriter
            .rewrite_single(&original, &[violation()], RewriteMode::ClarityFix)
            .await;
        assert_eq!(fixed, original);
    }

    #[tokio::test]
    async fn test_transport_failure_returns_original() {
        let rewriter = rewriter(Arc::new(FailingTransport));
        let mut original = item();
        original.answer = "nonsense".to_string();
        let fixed = rewriter
            .rewrite_single(&original, &[violation()], RewriteMode::ClarityFix)
            .await;
        assert_eq!(fixed, original);
    }

    #[test]
    fn test_mode_instructions_are_distinct() {
        let modes = [
            RewriteMode::FormatFix,
            RewriteMode::DistractorStrengthen,
            RewriteMode::ClarityFix,
            RewriteMode::CognitiveAdjust,
            RewriteMode::DifficultyAdjust,
            RewriteMode::TopicGrounding,
        ];
        let mut seen = std::collections::HashSet::new();
        for mode in modes {
            assert!(seen.insert(mode_instruction(mode)));
        }
    }
}
