//! Bloom Hint Budget
//!
//! Computes how verbose the per-slot Bloom scaffolding in writer prompts
//! should be. Risk signals raise verbosity; slot pressure and time
//! compression lower it to protect the output token budget. One-shot
//! reinforcement carries drift feedback into the next run.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

use examsmith_core::bloom::{BloomLevel, DemandTier};
use examsmith_core::intent::StudentLevel;
use examsmith_core::item::BloomAlignmentLog;

/// Default trust score for the writer role when no calibration exists.
pub const DEFAULT_TRUST_SCORE: u8 = 6;

/// Hint verbosity tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum HintMode {
    Minimal,
    Standard,
    Full,
}

impl HintMode {
    /// One tier down; Minimal stays Minimal.
    pub fn downgrade(self) -> Self {
        match self {
            HintMode::Full => HintMode::Standard,
            HintMode::Standard | HintMode::Minimal => HintMode::Minimal,
        }
    }
}

impl std::fmt::Display for HintMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HintMode::Minimal => "MINIMAL",
            HintMode::Standard => "STANDARD",
            HintMode::Full => "FULL",
        };
        write!(f, "{}", s)
    }
}

/// Signals feeding the risk score.
#[derive(Debug, Clone)]
pub struct HintBudgetInput {
    pub depth_ceiling: BloomLevel,
    /// Drift rate measured on the previous run, 0.0 when unknown.
    pub previous_drift_rate: f64,
    pub student_level: StudentLevel,
    pub slot_count: usize,
    pub time_minutes: u32,
    /// Writer reliability estimate, 0 to 10.
    pub trust_score: u8,
}

/// Budget decision plus the scoring trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintBudgetOutcome {
    pub hint_mode: HintMode,
    pub risk_score: i32,
    pub trace: Vec<String>,
}

#[derive(Debug, Default)]
struct HintCarryover {
    next_run_boost: bool,
    last_run_rewrite_count: u32,
}

/// Process-wide adaptive state: the one-shot hint boost, the previous run's
/// rewrite count, and the last Bloom alignment log snapshot. Written at run
/// end, read (and for the boost, cleared) at run start.
#[derive(Debug)]
pub struct AdaptiveState {
    carryover: Mutex<HintCarryover>,
    last_alignment: Mutex<Option<BloomAlignmentLog>>,
}

impl AdaptiveState {
    pub const fn new() -> Self {
        Self {
            carryover: Mutex::new(HintCarryover {
                next_run_boost: false,
                last_run_rewrite_count: 0,
            }),
            last_alignment: Mutex::new(None),
        }
    }

    /// The process-wide instance used when no explicit state is supplied.
    pub fn global() -> std::sync::Arc<AdaptiveState> {
        static GLOBAL: std::sync::OnceLock<std::sync::Arc<AdaptiveState>> =
            std::sync::OnceLock::new();
        GLOBAL
            .get_or_init(|| std::sync::Arc::new(AdaptiveState::new()))
            .clone()
    }

    /// Run-end write: rewrite count and the alignment snapshot.
    pub fn record_run_end(&self, rewrite_count: u32, log: BloomAlignmentLog) {
        if let Ok(mut carryover) = self.carryover.lock() {
            carryover.last_run_rewrite_count = rewrite_count;
        }
        if let Ok(mut last) = self.last_alignment.lock() {
            *last = Some(log);
        }
    }

    /// Snapshot of the most recent alignment log, for post-run inspection.
    pub fn last_alignment_log(&self) -> Option<BloomAlignmentLog> {
        self.last_alignment.lock().ok().and_then(|l| l.clone())
    }

    pub fn last_run_rewrite_count(&self) -> u32 {
        self.carryover
            .lock()
            .map(|c| c.last_run_rewrite_count)
            .unwrap_or(0)
    }

    fn take_boost(&self) -> bool {
        self.carryover
            .lock()
            .map(|mut c| std::mem::take(&mut c.next_run_boost))
            .unwrap_or(false)
    }

    fn set_boost(&self) {
        if let Ok(mut carryover) = self.carryover.lock() {
            carryover.next_run_boost = true;
        }
    }
}

impl Default for AdaptiveState {
    fn default() -> Self {
        Self::new()
    }
}

/// Arm the one-shot +2 reinforcement when measured drift exceeded 0.5.
/// Exactly one subsequent budget run consumes it.
pub fn apply_adaptive_drift_boost(drift_rate: f64, state: &AdaptiveState) {
    if drift_rate > 0.5 {
        debug!(
            "drift rate {:.2} exceeds 0.5, arming next-run hint boost",
            drift_rate
        );
        state.set_boost();
    }
}

/// Compute the hint mode for a run.
///
/// `tentative_hint_block` is the caller's pre-built per-slot hint block; when
/// supplied, its length drives the token-safety downgrade. The
/// rewrite-instability override has the highest priority and forces MINIMAL
/// regardless of score or block size.
pub fn run_bloom_hint_budget(
    input: &HintBudgetInput,
    tentative_hint_block: Option<&str>,
    state: &AdaptiveState,
) -> HintBudgetOutcome {
    let mut score: i32 = 0;
    let mut trace = Vec::new();

    if input.depth_ceiling >= BloomLevel::Analyze {
        score += 2;
        trace.push("+2 ceiling risk (depth ceiling at analyze or above)".to_string());
    }
    if input.depth_ceiling >= BloomLevel::Evaluate {
        score += 1;
        trace.push("+1 ceiling risk bonus (depth ceiling at evaluate or above)".to_string());
    }

    if input.previous_drift_rate >= 0.25 {
        score += 2;
        trace.push(format!(
            "+2 drift (previous run drift rate {:.2})",
            input.previous_drift_rate
        ));
    }
    if input.previous_drift_rate >= 0.50 {
        score += 2;
        trace.push("+2 drift bonus (drift rate at 0.50 or above)".to_string());
    }

    if matches!(input.student_level, StudentLevel::Honors | StudentLevel::Ap) {
        score += 1;
        trace.push(format!("+1 student rigor ({})", input.student_level));
    }

    if input.slot_count >= 9 {
        score -= 2;
        trace.push(format!("-2 slot pressure ({} slots)", input.slot_count));
    }
    if input.slot_count >= 12 {
        score -= 2;
        trace.push("-2 slot pressure bonus (12 slots or more)".to_string());
    }

    if input.time_minutes < 15 {
        score -= 2;
        trace.push(format!(
            "-2 time compression ({} minutes)",
            input.time_minutes
        ));
    }
    if input.time_minutes < 10 {
        score -= 2;
        trace.push("-2 time compression bonus (under 10 minutes)".to_string());
    }

    if input.trust_score >= 7 {
        score -= 1;
        trace.push(format!("-1 trust dampener (trust {})", input.trust_score));
    }
    if input.trust_score >= 9 {
        score -= 1;
        trace.push("-1 trust dampener bonus (trust 9 or above)".to_string());
    }

    if state.take_boost() {
        score += 2;
        trace.push("+2 adaptive reinforcement boost".to_string());
    }

    let mut mode = if score <= 0 {
        HintMode::Minimal
    } else if score <= 3 {
        HintMode::Standard
    } else {
        HintMode::Full
    };
    trace.push(format!("risk score {} selects {}", score, mode));

    // Token safety guard: oversized hint blocks downgrade one tier.
    if let Some(block) = tentative_hint_block {
        let threshold = if input.slot_count >= 10 { 2400 } else { 3600 };
        if block.len() > threshold {
            mode = mode.downgrade();
            trace.push(format!(
                "token safety guard: hint block {} chars exceeds {}, downgraded to {}",
                block.len(),
                threshold,
                mode
            ));
        }
    }

    // Rewrite-instability override: highest priority.
    let previous_rewrites = state.last_run_rewrite_count();
    let instability_threshold = (input.slot_count as f64 * 0.5).ceil() as u32;
    if input.slot_count >= 10 && previous_rewrites > instability_threshold {
        mode = HintMode::Minimal;
        trace.push(format!(
            "rewrite instability override: {} rewrites last run exceeds {}, forcing MINIMAL",
            previous_rewrites, instability_threshold
        ));
    }

    debug!("hint budget: score {}, mode {}", score, mode);
    HintBudgetOutcome {
        hint_mode: mode,
        risk_score: score,
        trace,
    }
}

/// Which scaffolding pieces one slot's hint directive includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHintPlan {
    pub include_label: bool,
    pub include_verbs: bool,
    /// 0 means all verbs up to three; 1 means a single verb.
    pub verb_count: usize,
    pub include_example_starter: bool,
    pub include_structure_note: bool,
}

/// The 3x3 verbosity table over demand tier and hint mode.
pub fn slot_hint_plan(tier: DemandTier, mode: HintMode) -> SlotHintPlan {
    let plan = |verbs: bool, verb_count: usize, example: bool, structure: bool| SlotHintPlan {
        include_label: true,
        include_verbs: verbs,
        verb_count,
        include_example_starter: example,
        include_structure_note: structure,
    };
    match (tier, mode) {
        (DemandTier::Low, HintMode::Minimal) => plan(false, 0, false, false),
        (DemandTier::Apply, HintMode::Minimal) => plan(false, 0, false, false),
        (DemandTier::High, HintMode::Minimal) => plan(true, 1, false, false),
        (DemandTier::Low, HintMode::Standard) => plan(false, 0, false, false),
        (DemandTier::Apply, HintMode::Standard) => plan(true, 0, false, false),
        (DemandTier::High, HintMode::Standard) => plan(true, 0, true, false),
        (DemandTier::Low, HintMode::Full) => plan(true, 0, false, false),
        (DemandTier::Apply, HintMode::Full) => plan(true, 0, true, false),
        (DemandTier::High, HintMode::Full) => plan(true, 0, true, true),
    }
}
