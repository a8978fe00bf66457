//! Examsmith Agents Module
//!
//! The agents module provides the assessment-generation agents: the
//! deterministic pre-validator and Gatekeeper, the Architect planner, the
//! hint-budget controller, the parallel Writer with its surgical Rewriter
//! loop, the post-writer analysts, and the coordinating orchestrator.

pub mod architect;
pub mod astronomer;
pub mod builder;
pub mod coordinator;
pub mod error;
pub mod gatekeeper;
pub mod hint_budget;
pub mod philosopher;
pub mod prompt_engineer;
pub mod rewriter;
pub mod writer;

pub use architect::{format_question_types, plan_blueprint, ArchitectOutcome};
pub use astronomer::{run_astronomer, AstronomerReport};
pub use builder::build_assessment;
pub use coordinator::{
    DefaultsSource, GatekeeperSummary, PipelineCoordinator, PipelineResult, RunOptions,
    TierSource, MAX_CYCLES,
};
pub use error::PipelineError;
pub use gatekeeper::{validate_single, GateOutcome};
pub use hint_budget::{
    apply_adaptive_drift_boost, run_bloom_hint_budget, AdaptiveState, HintBudgetInput,
    HintBudgetOutcome, HintMode,
};
pub use philosopher::{Philosopher, PhilosopherMode, PhilosopherReport, PhilosopherStatus};
pub use prompt_engineer::{run_prompt_engineer, PromptEngineerReport};
pub use rewriter::SurgicalRewriter;
pub use writer::{Writer, WriterEngine, WriterOutput, GROUP_SIZE, MAX_RETRY_ROUNDS};
