//! Sequential Adaptive-Chunking Writer
//!
//! Single-path fallback engine: one chunk at a time, chunk size halved on
//! truncation and grown back on clean runs. Kept selectable for transports
//! that cannot sustain parallel dispatch.

use std::collections::{HashMap, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use examsmith_core::blueprint::{BlueprintPlan, Slot};
use examsmith_core::item::{GeneratedItem, WriterTelemetry};

use super::{Writer, WriterOutput, GLOBAL_REWRITE_CAP_MAX};
use crate::hint_budget::HintBudgetOutcome;

/// Chunk size the sequential engine starts at.
pub const DEFAULT_CHUNK_SIZE: usize = 3;
/// Ceiling the chunk size grows back to on clean runs.
pub const MAX_CHUNK_SIZE: usize = 6;
/// Retries allowed per slot batch before a slot is dropped.
pub const MAX_TRUNCATION_RETRIES: usize = 3;

impl Writer {
    /// The sequential fallback engine. Shares group dispatch, binding, and
    /// the gate loop with the parallel engine.
    pub async fn write_adaptive(
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
        let mut queue: VecDeque<&Slot> = Self::llm_slots(blueprint).into();
        let mut attempts: HashMap<String, usize> = HashMap::new();
        let mut chunk_size = DEFAULT_CHUNK_SIZE;

        let global_cap = ((blueprint.slots.len() as u32) * 3).min(GLOBAL_REWRITE_CAP_MAX);
        let mut global_rewrites = 0u32;

        info!(
            "adaptive writer: {} slot(s), starting chunk size {}",
            queue.len(),
            chunk_size
        );

        while !queue.is_empty() {
            if cancel.is_cancelled() {
                warn!("adaptive writer cancelled with {} slot(s) pending", queue.len());
                break;
            }
            let take = chunk_size.min(queue.len());
            let chunk: Vec<&Slot> = queue.drain(..take).collect();
            let result = self
                .run_group(blueprint, &chunk, scribe.hint_mode, cancel)
                .await;
            telemetry.chunk_sizes.push(chunk.len());

            if result.truncated {
                telemetry.truncation_events += 1;
                chunk_size = (chunk_size / 2).max(1);
                info!("truncation: chunk size halved to {}", chunk_size);
            } else if result.error.is_none() {
                chunk_size = (chunk_size + 1).min(MAX_CHUNK_SIZE);
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

            for slot in chunk {
                if items.contains_key(&slot.id) {
                    continue;
                }
                let tried = attempts.entry(slot.id.clone()).or_insert(0);
                *tried += 1;
                if *tried <= MAX_TRUNCATION_RETRIES {
                    queue.push_back(slot);
                } else {
                    warn!("slot {} dropped after {} retries", slot.id, MAX_TRUNCATION_RETRIES);
                }
            }
        }

        self.filler_pass(blueprint, &mut items, &mut telemetry).await;
        Self::finish_run(blueprint, items, telemetry, residual_violations)
    }
}
