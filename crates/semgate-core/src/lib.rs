//! semgate core library
//!
//! Pure domain logic of the semantic acceptance gate: task model and store,
//! prompt rendering and budget fitting, the verdict parser, consensus,
//! threshold policy, the summary contract and the garbled-text precheck.
//! Nothing here spawns processes or writes artifacts.

pub mod batch;
pub mod brief;
pub mod budget;
pub mod consensus;
pub mod error;
pub mod fakes;
pub mod integrity;
pub mod obs;
pub mod policy;
pub mod self_check;
pub mod summary;
pub mod task;
pub mod telemetry;
pub mod verdict;

pub use batch::{parse_task_ids_csv, partition, select_task_ids, Batch};
pub use brief::{render_brief, strip_refs_clause, truncate_chars, BriefLimits};
pub use budget::{build_batch_prompt, fit_prompt, FittedPrompt, MIN_PROMPT_CEILING};
pub use consensus::{majority, reconcile, Finding, VoteTally};
pub use error::{GateError, Result};
pub use integrity::{scan_task_text, IntegrityHit, IntegrityReport, IntegritySummary};
pub use policy::{GatePolicy, PolicyDecision};
pub use self_check::{run_self_check, SelfCheckOutcome};
pub use summary::{
    enforce_summary_contract, validate_summary, BatchMeta, CheckedSummary, GateStatus,
    GateSummary, RunMeta, SummaryConfig, SummaryHeader, VerdictCounts,
};
pub use task::{JsonTaskStore, RawDocument, Task, TaskStore, TaskView};
pub use telemetry::init_tracing;
pub use verdict::{parse_verdicts, ParsedAnswer, Verdict, VerdictRecord};

/// Crate version, recorded in logs by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
