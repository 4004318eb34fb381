//! semgate CI - semantic acceptance gate orchestration
//!
//! Provides the gate pipeline that:
//! - Rejects garbled task text before judging
//! - Batches tasks into budget-fitted prompts
//! - Invokes an external judge (Codex CLI) once per consensus run
//! - Reconciles verdicts, applies the threshold policy and writes artifacts

pub mod artifacts;
pub mod config;
pub mod fakes;
pub mod judge;
pub mod pipeline;

// Re-export key types
pub use artifacts::{default_out_dir, GATE_DIR_NAME, SELF_CHECK_DIR_NAME};
pub use config::{ConfigError, GarbledGate, GateConfig, ReasoningEffort};
pub use judge::{CodexJudge, Judge, JudgeConfig, JudgeOutcome};
pub use pipeline::{run_precheck, GateOutcome, GatePipeline, PipelineError};
