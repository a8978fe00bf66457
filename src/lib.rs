//! Examsmith - Classroom Assessment Generation Pipeline
//!
//! Re-exports the workspace crates for integration tests and embedders.

pub use examsmith_agents as agents;
pub use examsmith_core as core;
