//! Astronomer Agent
//!
//! Predicted-performance analytics over the writer draft: per-item correct
//! rates, time estimates, cognitive load, misconception clusters, and
//! fatigue/confusion risks. Reads the draft, never mutates it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use examsmith_core::bloom::DemandTier;
use examsmith_core::blueprint::{BlueprintPlan, Difficulty};

use crate::writer::WriterOutput;

/// Per-item forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemForecast {
    pub slot_id: String,
    /// Predicted fraction of the class answering correctly.
    pub predicted_correct_rate: f64,
    pub estimated_seconds: u32,
    /// 0.0 (trivial) to 1.0 (heavy working-memory demand).
    pub cognitive_load: f64,
}

/// Slots that share a targeted misconception.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MisconceptionCluster {
    pub misconception: String,
    pub slot_ids: Vec<String>,
}

/// The Astronomer's full report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstronomerReport {
    pub item_forecasts: Vec<ItemForecast>,
    pub misconception_clusters: Vec<MisconceptionCluster>,
    /// 0.0 to 1.0: likelihood the class runs out of steam before the end.
    pub fatigue_risk: f64,
    /// 0.0 to 1.0: density of residual defects and overlong stems.
    pub confusion_risk: f64,
    pub predicted_average_score: f64,
    pub total_estimated_seconds: u32,
}

fn base_correct_rate(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy => 0.85,
        Difficulty::Medium => 0.70,
        Difficulty::Hard => 0.55,
        Difficulty::Challenge => 0.40,
    }
}

fn difficulty_time_factor(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy => 0.8,
        Difficulty::Medium => 1.0,
        Difficulty::Hard => 1.25,
        Difficulty::Challenge => 1.5,
    }
}

/// Run the analytics pass.
pub fn run_astronomer(blueprint: &BlueprintPlan, draft: &WriterOutput) -> AstronomerReport {
    let mut forecasts = Vec::with_capacity(draft.items.len());
    let mut total_seconds = 0u32;

    for item in &draft.items {
        let Some(slot) = blueprint.slot(&item.slot_id) else {
            continue;
        };
        let residuals = draft
            .residual_violations
            .iter()
            .filter(|v| v.slot_id == slot.id)
            .count();

        let tier_penalty = match DemandTier::for_level(slot.cognitive_demand) {
            DemandTier::Low => 0.0,
            DemandTier::Apply => 0.03,
            DemandTier::High => 0.08,
        };
        let predicted_correct_rate = (base_correct_rate(slot.difficulty)
            - tier_penalty
            - residuals as f64 * 0.10)
            .clamp(0.05, 0.98);

        let estimated_seconds = ((blueprint.pacing_seconds_per_item as f64)
            * difficulty_time_factor(slot.difficulty)
            + item.prompt.len() as f64 / 25.0) as u32;
        total_seconds += estimated_seconds;

        let cognitive_load = ((slot.cognitive_demand.rank() as f64 / 5.0) * 0.6
            + (base_correct_rate(Difficulty::Easy) - base_correct_rate(slot.difficulty)) * 0.9)
            .clamp(0.0, 1.0);

        forecasts.push(ItemForecast {
            slot_id: slot.id.clone(),
            predicted_correct_rate,
            estimated_seconds,
            cognitive_load,
        });
    }

    let misconception_clusters = blueprint
        .uar
        .misconceptions
        .iter()
        .map(|misconception| {
            let needle = misconception.to_lowercase();
            MisconceptionCluster {
                misconception: misconception.clone(),
                slot_ids: draft
                    .items
                    .iter()
                    .filter(|item| item.prompt.to_lowercase().contains(&needle))
                    .map(|item| item.slot_id.clone())
                    .collect(),
            }
        })
        .collect();

    let budget_seconds = (blueprint.uar.time_minutes * 60).max(1);
    let fatigue_risk = (total_seconds as f64 / budget_seconds as f64 - 0.8).clamp(0.0, 1.0);

    let overlong = draft
        .items
        .iter()
        .filter(|item| item.prompt.len() > 300)
        .count();
    let confusion_risk = if draft.items.is_empty() {
        0.0
    } else {
        ((draft.residual_violations.len() + overlong) as f64 / draft.items.len() as f64)
            .clamp(0.0, 1.0)
    };

    let predicted_average_score = if forecasts.is_empty() {
        0.0
    } else {
        forecasts
            .iter()
            .map(|f| f.predicted_correct_rate)
            .sum::<f64>()
            / forecasts.len() as f64
    };

    debug!(
        "astronomer: avg score {:.2}, fatigue {:.2}, confusion {:.2}",
        predicted_average_score, fatigue_risk, confusion_risk
    );
    AstronomerReport {
        item_forecasts: forecasts,
        misconception_clusters,
        fatigue_risk,
        confusion_risk,
        predicted_average_score,
        total_estimated_seconds: total_seconds,
    }
}
