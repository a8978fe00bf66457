//! Writer Agent (Parallel Engine)
//!
//! Fans slot groups out to the LLM in parallel with all-settled semantics,
//! binds streamed items to slots in arrival order, runs the per-item
//! Gatekeeper/Rewriter loop, and retries missing slots. A sequential
//! adaptive-chunking engine lives in [`adaptive`] as a selectable fallback.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use examsmith_core::blueprint::{BlueprintPlan, QuestionType, Slot};
use examsmith_core::config::PipelineConfig;
use examsmith_core::intent::TeacherIntent;
use examsmith_core::item::{
    AlignmentDirection, BloomAlignmentLog, BloomAlignmentRecord, GeneratedItem, RewriteMode,
    Violation, ViolationKind, WriterTelemetry,
};
use examsmith_core::llm_transport::{LlmRequest, LlmTransport, StreamEvent};
use examsmith_core::parser;

use crate::gatekeeper;
use crate::hint_budget::HintBudgetOutcome;
use crate::rewriter::SurgicalRewriter;

pub mod adaptive;
pub mod fluency;
pub mod prompts;

/// Largest slot group sent in one parallel LLM call.
pub const GROUP_SIZE: usize = 5;
/// Retry rounds for slots still missing after the parallel dispatch.
pub const MAX_RETRY_ROUNDS: usize = 2;
/// Rewrite attempts allowed per slot inside the gate loop.
pub const MAX_REWRITES_PER_SLOT: u32 = 2;
/// Absolute ceiling on rewrites per run.
pub const GLOBAL_REWRITE_CAP_MAX: u32 = 30;

/// Which writer engine the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterEngine {
    /// Canonical: balanced groups dispatched concurrently.
    #[default]
    Parallel,
    /// Fallback: one chunk at a time, size adapted to truncations.
    SequentialAdaptive,
}

/// Everything the Writer hands back to the coordinator.
#[derive(Debug, Clone)]
pub struct WriterOutput {
    /// Accepted items, re-projected into blueprint slot order.
    pub items: Vec<GeneratedItem>,
    pub telemetry: WriterTelemetry,
    /// Alignment rows in blueprint slot order.
    pub alignment_log: BloomAlignmentLog,
    /// Violations still standing on best-effort accepted items.
    pub residual_violations: Vec<Violation>,
}

pub(crate) struct GroupResult {
    pub bound: Vec<GeneratedItem>,
    pub truncated: bool,
    pub error: Option<String>,
}

/// Split slots into balanced groups of at most `max_size`, sized evenly
/// (6 slots become 3+3, never 5+1).
pub(crate) fn balanced_partition<'a>(slots: &[&'a Slot], max_size: usize) -> Vec<Vec<&'a Slot>> {
    if slots.is_empty() {
        return Vec::new();
    }
    let group_count = slots.len().div_ceil(max_size);
    let base = slots.len() / group_count;
    let extra = slots.len() % group_count;
    let mut groups = Vec::with_capacity(group_count);
    let mut cursor = 0;
    for index in 0..group_count {
        let size = base + usize::from(index < extra);
        groups.push(slots[cursor..cursor + size].to_vec());
        cursor += size;
    }
    groups
}

/// Bind a parsed block to its slot, forcibly overwriting the identity
/// fields with the slot's values.
fn bind_value(value: serde_json::Value, slot: &Slot) -> Option<GeneratedItem> {
    let prompt = value.get("prompt")?.as_str()?.trim().to_string();
    if prompt.is_empty() {
        return None;
    }
    let options = value
        .get("options")
        .and_then(|v| v.as_array())
        .map(|array| {
            array
                .iter()
                .filter_map(|o| o.as_str().map(str::to_string))
                .collect::<Vec<String>>()
        })
        .filter(|options| !options.is_empty());
    let answer = match value.get("answer") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };
    let explanation = value
        .get("explanation")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let bloom = value
        .get("bloom")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());
    Some(GeneratedItem {
        slot_id: slot.id.clone(),
        question_type: slot.question_type,
        prompt,
        options,
        answer,
        explanation,
        bloom,
    })
}

struct GateFixOutcome {
    item: GeneratedItem,
    violations_seen: u32,
    rewrites_used: u32,
    residual: Vec<Violation>,
}

/// The parallel writer engine plus the shared binding/gating machinery.
pub struct Writer {
    transport: Arc<dyn LlmTransport>,
    config: PipelineConfig,
    rewriter: SurgicalRewriter,
}

impl Writer {
    pub fn new(transport: Arc<dyn LlmTransport>, config: PipelineConfig) -> Self {
        let rewriter = SurgicalRewriter::new(Arc::clone(&transport), &config);
        Self {
            transport,
            config,
            rewriter,
        }
    }

    /// One streaming group call: dispatch, collect events, bind in arrival
    /// order. A transport failure leaves the result empty so the retry loop
    /// picks the slots up.
    pub(crate) async fn run_group(
        &self,
        blueprint: &BlueprintPlan,
        slots: &[&Slot],
        mode: crate::hint_budget::HintMode,
        cancel: &CancellationToken,
    ) -> GroupResult {
        if cancel.is_cancelled() {
            return GroupResult {
                bound: Vec::new(),
                truncated: false,
                error: Some("group call cancelled by deadline".to_string()),
            };
        }
        let request = LlmRequest {
            model: self.config.provider.model.clone(),
            prompt: prompts::build_group_prompt(blueprint, &blueprint.uar, slots, mode),
            temperature: self.config.roles.writer_temperature,
            max_output_tokens: self.config.writer_max_tokens(slots.len()),
            request_id: Some(Uuid::new_v4().to_string()),
        };
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(slots.len() + 2);
        let call = self.transport.call_streaming(request, tx);
        let collect = async {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        };

        let (call_result, events) = tokio::select! {
            _ = cancel.cancelled() => {
                return GroupResult {
                    bound: Vec::new(),
                    truncated: false,
                    error: Some("group call cancelled by deadline".to_string()),
                };
            }
            joined = async { tokio::join!(call, collect) } => joined,
        };

        let mut bound = Vec::new();
        let mut truncated = false;
        let mut cursor = 0usize;
        for event in events {
            match event {
                StreamEvent::Item(block) => {
                    if cursor >= slots.len() {
                        warn!("group emitted more blocks than slots, ignoring extra");
                        continue;
                    }
                    match parser::parse_item_block(&block) {
                        Ok(value) => {
                            if let Some(item) = bind_value(value, slots[cursor]) {
                                bound.push(item);
                            }
                        }
                        Err(e) => {
                            warn!("slot {} block unparseable: {}", slots[cursor].id, e);
                        }
                    }
                    cursor += 1;
                }
                StreamEvent::Truncated(leftover) => {
                    truncated = true;
                    if cursor < slots.len() {
                        if let Some(value) = parser::salvage_truncated(&leftover) {
                            debug!("salvaged truncated tail for slot {}", slots[cursor].id);
                            if let Some(item) = bind_value(value, slots[cursor]) {
                                bound.push(item);
                            }
                            cursor += 1;
                        }
                    }
                }
            }
        }

        let error = call_result.err().map(|e| e.to_string());
        if let Some(e) = &error {
            warn!("group call failed: {}", e);
        }
        GroupResult {
            bound,
            truncated,
            error,
        }
    }

    /// Per-item gate loop: validate, rewrite under the classified mode,
    /// re-validate, accept the best candidate seen. Bounded by the per-slot
    /// cap, the global cap, and stagnation detection.
    async fn gate_and_fix(
        &self,
        slot: &Slot,
        item: GeneratedItem,
        intent: &TeacherIntent,
        scope_width: examsmith_core::blueprint::ScopeWidth,
        global_rewrites: &mut u32,
        global_cap: u32,
    ) -> GateFixOutcome {
        let mut current = item;
        let mut outcome = gatekeeper::validate_single(slot, &current, intent, scope_width);
        let mut violations_seen = outcome.violations.len() as u32;
        let mut best = current.clone();
        let mut best_residual = outcome.violations.clone();
        let mut rewrites_used = 0u32;
        let mut stagnant_attempts = 0u32;

        while !outcome.ok
            && rewrites_used < MAX_REWRITES_PER_SLOT
            && *global_rewrites < global_cap
            && stagnant_attempts < 2
        {
            let mode = outcome.mode.unwrap_or(RewriteMode::ClarityFix);
            let rewritten = self
                .rewriter
                .rewrite_single(&current, &outcome.violations, mode)
                .await;
            rewrites_used += 1;
            *global_rewrites += 1;

            let next = gatekeeper::validate_single(slot, &rewritten, intent, scope_width);
            violations_seen += next.violations.len() as u32;
            if next.violations.len() < best_residual.len() {
                best = rewritten.clone();
                best_residual = next.violations.clone();
                stagnant_attempts = 0;
            } else {
                stagnant_attempts += 1;
            }
            current = rewritten;
            outcome = next;
        }
        if stagnant_attempts >= 2 {
            debug!("slot {}: rewrite stagnation, accepting best candidate", slot.id);
        }

        GateFixOutcome {
            item: best,
            violations_seen,
            rewrites_used,
            residual: best_residual,
        }
    }

    /// Second-pass scan for generic filler; flagged items get one more
    /// clarity rewrite.
    async fn filler_pass(
        &self,
        blueprint: &BlueprintPlan,
        items: &mut HashMap<String, GeneratedItem>,
        telemetry: &mut WriterTelemetry,
    ) {
        for slot in &blueprint.slots {
            let Some(item) = items.get(&slot.id).cloned() else {
                continue;
            };
            let lower = item.prompt.to_lowercase();
            if prompts::FORBIDDEN_FILLER_PHRASES
                .iter()
                .any(|phrase| lower.contains(phrase))
            {
                debug!("slot {}: filler phrase detected, rewriting", slot.id);
                let violation = Violation {
                    slot_id: slot.id.clone(),
                    kind: ViolationKind::ForbiddenContent,
                    message: "stem pads the question with generic filler".to_string(),
                };
                let rewritten = self
                    .rewriter
                    .rewrite_single(&item, &[violation], RewriteMode::ClarityFix)
                    .await;
                telemetry.rewrite_count += 1;
                items.insert(slot.id.clone(), rewritten);
            }
        }
    }

    /// Alignment log in blueprint slot order. An undetectable level counts
    /// as agreement: the detector found nothing to disagree with.
    fn build_alignment_log(
        blueprint: &BlueprintPlan,
        items: &HashMap<String, GeneratedItem>,
    ) -> BloomAlignmentLog {
        let mut log = Vec::new();
        for slot in &blueprint.slots {
            let Some(item) = items.get(&slot.id) else {
                continue;
            };
            let writer_bloom = item.bloom.unwrap_or(slot.cognitive_demand);
            let detected = gatekeeper::detect_bloom(&item.prompt);
            let (aligned, direction) = match detected {
                Some(level) if level == slot.cognitive_demand => {
                    (true, AlignmentDirection::Aligned)
                }
                Some(level) if level > slot.cognitive_demand => {
                    (false, AlignmentDirection::Above)
                }
                Some(_) => (false, AlignmentDirection::Below),
                None => (true, AlignmentDirection::Undetected),
            };
            log.push(BloomAlignmentRecord {
                slot_id: slot.id.clone(),
                writer_bloom,
                gatekeeper_bloom: detected,
                aligned,
                direction,
            });
        }
        log
    }

    fn finish_run(
        blueprint: &BlueprintPlan,
        mut items: HashMap<String, GeneratedItem>,
        mut telemetry: WriterTelemetry,
        residual_violations: Vec<Violation>,
    ) -> WriterOutput {
        let alignment_log = Self::build_alignment_log(blueprint, &items);
        let ordered: Vec<GeneratedItem> = blueprint
            .slots
            .iter()
            .filter_map(|slot| items.remove(&slot.id))
            .collect();
        telemetry.final_problem_count = ordered.len();
        info!(
            "writer finished: {}/{} slots filled, {} rewrites, {} truncations",
            ordered.len(),
            blueprint.slots.len(),
            telemetry.rewrite_count,
            telemetry.truncation_events
        );
        WriterOutput {
            items: ordered,
            telemetry,
            alignment_log,
            residual_violations,
        }
    }

    /// Fill arithmetic-fluency slots locally; they never reach the LLM.
    fn pregenerate_fluency(
        blueprint: &BlueprintPlan,
        items: &mut HashMap<String, GeneratedItem>,
    ) {
        let min_grade = blueprint.uar.min_grade().unwrap_or(7);
        for slot in &blueprint.slots {
            if slot.question_type == QuestionType::ArithmeticFluency {
                items.insert(slot.id.clone(), fluency::generate_fluency_item(slot, min_grade));
            }
        }
    }

    fn llm_slots(blueprint: &BlueprintPlan) -> Vec<&Slot> {
        blueprint
            .slots
            .iter()
            .filter(|slot| slot.question_type != QuestionType::ArithmeticFluency)
            .collect()
    }

    /// The canonical parallel engine.
    pub async fn write_parallel(
        &self,
        blueprint: &BlueprintPlan,
        scribe: &HintBudgetOutcome,
        cancel: &CancellationToken,
    ) -> WriterOutput {
        let intent = &blueprint.uar;
        let mut items: HashMap<String, GeneratedItem> = HashMap::new();
        let mut telemetry = WriterTelemetry::default();
        let mut residual_violations = Vec::new();

        Self::pregenerate_fluency(blueprint, &mut items);
        let llm_slots = Self::llm_slots(blueprint);
        let groups = balanced_partition(&llm_slots, GROUP_SIZE);
        info!(
            "dispatching {} group(s) over {} slot(s), hint mode {}",
            groups.len(),
            llm_slots.len(),
            scribe.hint_mode
        );

        // All-settled: every group completes or fails independently.
        let results = join_all(
            groups
                .iter()
                .map(|group| self.run_group(blueprint, group, scribe.hint_mode, cancel)),
        )
        .await;

        let global_cap = ((blueprint.slots.len() as u32) * 3).min(GLOBAL_REWRITE_CAP_MAX);
        let mut global_rewrites = 0u32;

        for (group, result) in groups.iter().zip(results) {
            telemetry.chunk_sizes.push(group.len());
            if result.truncated {
                telemetry.truncation_events += 1;
            }
            for item in result.bound {
                let Some(slot) = blueprint.slot(&item.slot_id) else {
                    continue;
                };
                let fixed = self
                    .gate_and_fix(
                        slot,
                        item,
                        intent,
                        blueprint.scope_width,
                        &mut global_rewrites,
                        global_cap,
                    )
                    .await;
                telemetry.gatekeeper_violations += fixed.violations_seen;
                telemetry.rewrite_count += fixed.rewrites_used;
                residual_violations.extend(fixed.residual);
                items.insert(slot.id.clone(), fixed.item);
            }
        }

        // Targeted retries for slots still missing, one batch per round.
        for round in 0..MAX_RETRY_ROUNDS {
            if cancel.is_cancelled() {
                break;
            }
            let missing: Vec<&Slot> = llm_slots
                .iter()
                .copied()
                .filter(|slot| !items.contains_key(&slot.id))
                .collect();
            if missing.is_empty() {
                break;
            }
            info!("retry round {}: {} missing slot(s)", round + 1, missing.len());
            let result = self
                .run_group(blueprint, &missing, scribe.hint_mode, cancel)
                .await;
            telemetry.chunk_sizes.push(missing.len());
            if result.truncated {
                telemetry.truncation_events += 1;
            }
            for item in result.bound {
                let Some(slot) = blueprint.slot(&item.slot_id) else {
                    continue;
                };
                let fixed = self
                    .gate_and_fix(
                        slot,
                        item,
                        intent,
                        blueprint.scope_width,
                        &mut global_rewrites,
                        global_cap,
                    )
                    .await;
                telemetry.gatekeeper_violations += fixed.violations_seen;
                telemetry.rewrite_count += fixed.rewrites_used;
                residual_violations.extend(fixed.residual);
                items.insert(slot.id.clone(), fixed.item);
            }
        }

        self.filler_pass(blueprint, &mut items, &mut telemetry).await;
        Self::finish_run(blueprint, items, telemetry, residual_violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examsmith_core::bloom::BloomLevel;
    use examsmith_core::blueprint::{Difficulty, PacingBand};

    fn slot(id: &str) -> Slot {
        Slot {
            id: id.to_string(),
            question_type: QuestionType::MultipleChoice,
            cognitive_demand: BloomLevel::Apply,
            difficulty: Difficulty::Medium,
            pacing: PacingBand::Normal,
            requires_image: false,
            operation: None,
        }
    }

    #[test]
    fn test_balanced_partition_six_is_three_three() {
        let slots: Vec<Slot> = (0..6).map(|i| slot(&format!("s{}", i))).collect();
        let refs: Vec<&Slot> = slots.iter().collect();
        let groups = balanced_partition(&refs, GROUP_SIZE);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 3);
        assert_eq!(groups[1].len(), 3);
    }

    #[test]
    fn test_balanced_partition_uneven() {
        let slots: Vec<Slot> = (0..13).map(|i| slot(&format!("s{}", i))).collect();
        let refs: Vec<&Slot> = slots.iter().collect();
        let groups = balanced_partition(&refs, GROUP_SIZE);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 4, 4]);
        let total: usize = sizes.iter().sum();
        assert_eq!(total, 13);
    }

    #[test]
    fn test_balanced_partition_empty() {
        let groups = balanced_partition(&[], GROUP_SIZE);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_bind_value_forces_identity() {
        let s = slot("slot-07");
        let value = serde_json::json!({
            "slotId": "whatever-the-model-said",
            "questionType": "essay",
            "prompt": "Solve 1/2 + 1/3.",
            "options": ["A. 5/6", "B. 2/5", "C. 1/6", "D. 3/5"],
            "answer": "A. 5/6",
            "bloom": "apply"
        });
        let item = bind_value(value, &s).expect("binds");
        assert_eq!(item.slot_id, "slot-07");
        assert_eq!(item.question_type, QuestionType::MultipleChoice);
        assert_eq!(item.bloom, Some(BloomLevel::Apply));
    }

    #[test]
    fn test_bind_value_rejects_missing_prompt() {
        let s = slot("slot-01");
        assert!(bind_value(serde_json::json!({"answer": "4"}), &s).is_none());
        assert!(bind_value(serde_json::json!({"prompt": "  "}), &s).is_none());
    }

    #[test]
    fn test_bind_value_coerces_numeric_answer() {
        let s = slot("slot-01");
        let item = bind_value(
            serde_json::json!({"prompt": "Compute 2 + 2.", "answer": 4}),
            &s,
        )
        .expect("binds");
        assert_eq!(item.answer, "4");
    }
}
