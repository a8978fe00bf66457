//! Examsmith Core Module
//!
//! The core module provides the shared data model, Bloom taxonomy, stream
//! parsing, LLM transport, and configuration for the Examsmith assessment
//! generation pipeline.

pub mod bloom;
pub mod blueprint;
pub mod config;
pub mod intent;
pub mod item;
pub mod llm_transport;
pub mod parser;
pub mod trace;

pub use bloom::{BloomLevel, DemandTier};
pub use blueprint::{
    ArithmeticOperation, BlueprintPlan, Difficulty, FormattingRules, OrderingStrategy, PacingBand,
    QuestionType, ScopeWidth, Slot,
};
pub use config::PipelineConfig;
pub use intent::{
    AssessmentType, BloomPreference, QuestionFormat, SectionStructure, StandardsAlignment,
    StudentLevel, SubscriptionTier, TeacherDefaults, TeacherIntent,
};
pub use item::{
    AlignmentDirection, AssessmentItem, AssessmentMetadata, BloomAlignmentLog,
    BloomAlignmentRecord, FinalAssessment, GeneratedItem, RewriteMode, Violation, ViolationKind,
    WriterTelemetry,
};
pub use llm_transport::{
    HttpLlmTransport, LlmProvider, LlmRequest, LlmTransport, ProviderSettings, StreamEvent,
    TokenUsage, TransportStats,
};
pub use parser::{ParsedStream, SentinelSplitter, END_OF_PROBLEM};
pub use trace::{Trace, TraceStep};
