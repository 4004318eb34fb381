//! Gate pipeline orchestration.
//!
//! One gate run: garbled precheck, id selection, batching, per-batch prompt
//! fitting and judge runs, consensus, policy, summary contract, artifacts.
//! Judge failures never abort the run; they surface as `Unknown` findings
//! and in the per-run metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{Local, Utc};
use futures::future::join_all;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use semgate_core::obs::{
    emit_batch_started, emit_gate_evaluated, emit_precheck_failed, emit_run_finished, gate_span,
};
use semgate_core::summary::SUMMARY_SCHEMA_INVALID;
use semgate_core::{
    enforce_summary_contract, fit_prompt, parse_verdicts, partition, reconcile, scan_task_text,
    Batch, BatchMeta, CheckedSummary, Finding, GateError, GateStatus, GateSummary,
    IntegrityReport, RunMeta, SummaryHeader, Task, TaskStore, Verdict, VerdictRecord,
};

use crate::artifacts::{run_paths, write_json, write_summary, write_text, PRECHECK_FILE};
use crate::config::{ConfigError, GarbledGate, GateConfig};
use crate::judge::Judge;

/// Prefix of the single status line printed per gate run.
pub const STATUS_PREFIX: &str = "SC_SEMANTIC_GATE_ALL";
/// Reason recorded for a selected id the store cannot resolve.
pub const TASK_NOT_FOUND_REASON: &str = "task not found";

/// Hard failures that stop a gate run before a summary is written.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "garbled precheck failed decode_errors={} parse_errors={} suspicious_hits={}",
        .0.summary.decode_errors,
        .0.summary.parse_errors,
        .0.summary.suspicious_hits
    )]
    Precheck(Box<IntegrityReport>),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Artifact(#[from] anyhow::Error),
}

impl PipelineError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        2
    }

    /// Short token for the `reason=` field of the status line.
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Precheck(_) => "precheck",
            PipelineError::Gate(_) => "store",
            PipelineError::Artifact(_) => "artifact",
        }
    }

    pub fn status_line(&self, out_dir: &Path) -> String {
        failure_status_line(self.reason(), out_dir)
    }
}

/// Status line for a run that stopped before a summary was written.
pub fn failure_status_line(reason: &str, out_dir: &Path) -> String {
    format!(
        "{STATUS_PREFIX} status=fail reason={reason} out={}",
        out_dir.display()
    )
}

/// Result of a completed gate run.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub out_dir: PathBuf,
    pub summary_path: PathBuf,
    /// The summary as assembled, before contract enforcement.
    pub summary: GateSummary,
    /// The summary as written.
    pub checked: CheckedSummary,
}

impl GateOutcome {
    pub fn status(&self) -> GateStatus {
        self.checked.status()
    }

    /// The single-line status record.
    pub fn status_line(&self) -> String {
        if !self.checked.is_valid() {
            return failure_status_line(SUMMARY_SCHEMA_INVALID, &self.out_dir);
        }
        format!(
            "{STATUS_PREFIX} status={} needs_fix={} unknown={} limit_needs_fix={} limit_unknown={} out={}",
            self.status().as_str(),
            self.summary.counts.needs_fix,
            self.summary.counts.unknown,
            self.summary.max_needs_fix,
            self.summary.max_unknown,
            self.out_dir.display()
        )
    }

    /// 0 when the gate passed, 1 on policy or contract failure.
    pub fn exit_code(&self) -> i32 {
        match self.status() {
            GateStatus::Ok => 0,
            GateStatus::Fail => 1,
        }
    }
}

/// Run the garbled-text precheck and write `garbled-precheck.json`.
pub fn run_precheck(
    store: &dyn TaskStore,
    config: &GateConfig,
) -> Result<IntegrityReport, PipelineError> {
    std::fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("create {:?}", config.out_dir))?;
    let report = scan_task_text(store, config.task_filter.as_ref());
    write_json(&config.out_dir.join(PRECHECK_FILE), &report)?;
    if !report.is_clean() {
        emit_precheck_failed(
            report.summary.decode_errors,
            report.summary.parse_errors,
            report.summary.suspicious_hits,
        );
    }
    Ok(report)
}

/// Gate pipeline orchestrator.
pub struct GatePipeline;

impl GatePipeline {
    /// Execute one gate run against `store`, asking `judge` for verdicts.
    ///
    /// Returns `Err` only for configuration, precheck, store and artifact
    /// failures. A failing gate is a successful run with `status = fail`.
    pub async fn run(
        store: &dyn TaskStore,
        judge: &dyn Judge,
        config: &GateConfig,
    ) -> Result<GateOutcome, PipelineError> {
        config.validate()?;
        std::fs::create_dir_all(&config.out_dir)
            .with_context(|| format!("create {:?}", config.out_dir))?;

        if config.garbled_gate == GarbledGate::On {
            let report = run_precheck(store, config)?;
            if !report.is_clean() {
                return Err(PipelineError::Precheck(Box::new(report)));
            }
        }

        let all_ids = store.task_ids()?;
        let ids = semgate_core::select_task_ids(
            &all_ids,
            config.task_filter.as_ref(),
            config.max_tasks,
        );
        let batches = partition(&ids, config.batch_size)?;

        let run_id = Uuid::new_v4();
        let span = gate_span(&run_id.to_string());
        Self::judge_all(store, judge, config, run_id, ids.len(), batches)
            .instrument(span)
            .await
    }

    async fn judge_all(
        store: &dyn TaskStore,
        judge: &dyn Judge,
        config: &GateConfig,
        run_id: Uuid,
        total_tasks: usize,
        batches: Vec<Batch>,
    ) -> Result<GateOutcome, PipelineError> {
        info!(
            total_tasks,
            batches = batches.len(),
            batch_size = config.batch_size,
            runs = config.consensus_runs,
            "Starting semantic gate"
        );

        let mut findings: BTreeMap<u32, Finding> = BTreeMap::new();
        let mut batch_meta = Vec::with_capacity(batches.len());
        for batch in &batches {
            let (batch_findings, meta) =
                Self::judge_batch(store, judge, config, batch, batches.len()).await?;
            for finding in batch_findings {
                findings.insert(finding.task_id, finding);
            }
            batch_meta.push(meta);
        }

        let header = SummaryHeader {
            run_id,
            date: Local::now().format("%Y-%m-%d").to_string(),
            generated_at: Utc::now(),
            batch_size: config.batch_size,
            total_tasks,
            config: config.summary_config(),
        };
        let summary = GateSummary::assemble(header, findings, batch_meta, config.policy());
        let value = serde_json::to_value(&summary).context("serialize summary")?;
        let checked = enforce_summary_contract(value);
        if !checked.is_valid() {
            warn!(errors = ?checked.errors, "summary failed its structural contract");
        }
        let summary_path = write_summary(&config.out_dir, &checked.value)?;

        emit_gate_evaluated(
            checked.status().as_str(),
            summary.counts.needs_fix,
            summary.counts.unknown,
        );

        Ok(GateOutcome {
            out_dir: config.out_dir.clone(),
            summary_path,
            summary,
            checked,
        })
    }

    async fn judge_batch(
        store: &dyn TaskStore,
        judge: &dyn Judge,
        config: &GateConfig,
        batch: &Batch,
        batch_count: usize,
    ) -> Result<(Vec<Finding>, BatchMeta), PipelineError> {
        let mut tasks: Vec<Task> = Vec::with_capacity(batch.len());
        let mut missing = Vec::new();
        for &id in &batch.task_ids {
            match store.resolve(id) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!(task_id = id, error = %e, "task could not be resolved");
                    missing.push(id);
                }
            }
        }
        let judged_ids: Vec<u32> = tasks.iter().map(|t| t.id).collect();

        let fitted = fit_prompt(
            &tasks,
            config.max_acceptance_items,
            config.effective_prompt_ceiling(),
        );
        if fitted.over_ceiling {
            warn!(
                batch = batch.index,
                prompt_chars = fitted.chars,
                ceiling = config.effective_prompt_ceiling(),
                "prompt exceeds ceiling even at the minimum brief budget"
            );
        }

        let runs = config.consensus_runs;
        info!(
            "batch {}/{} runs={} tasks={} prompt_chars={}",
            batch.index,
            batch_count,
            runs,
            batch.len(),
            fitted.chars
        );
        emit_batch_started(batch.index, batch_count, runs, batch.len(), fitted.chars);

        let mut run_meta = Vec::with_capacity(runs);
        let mut parsed = Vec::with_capacity(runs);
        if !judged_ids.is_empty() {
            let timeout = Duration::from_secs(config.timeout_secs);
            let prompt = fitted.prompt.as_str();
            let out_dir = config.out_dir.as_path();
            let batch_index = batch.index;
            let invoke = move |run: usize| {
                judge_run(judge, prompt, out_dir, batch_index, run, runs, timeout)
            };
            let results = if config.parallel_runs {
                join_all((1..=runs).map(invoke)).await
            } else {
                let mut results = Vec::with_capacity(runs);
                for run in 1..=runs {
                    results.push(invoke(run).await);
                }
                results
            };
            for result in results {
                let (meta, verdicts) = result?;
                run_meta.push(meta);
                parsed.push(verdicts);
            }
        }

        let mut findings = reconcile(&judged_ids, &parsed);
        findings.extend(missing.into_iter().map(|task_id| Finding {
            task_id,
            verdict: Verdict::Unknown,
            reason: TASK_NOT_FOUND_REASON.to_string(),
        }));

        let meta = BatchMeta {
            batch_index: batch.index,
            task_count: batch.len(),
            task_ids: batch.task_ids.clone(),
            prompt_chars: fitted.chars,
            prompt_trimmed: fitted.trimmed,
            prompt_over_ceiling: fitted.over_ceiling,
            task_brief_budget: fitted.task_brief_budget,
            // Zero when no task in the batch resolved and the judge was skipped.
            runs: run_meta.len(),
            run_meta,
        };
        Ok((findings, meta))
    }
}

/// Invoke the judge once and parse whatever answer it left behind.
async fn judge_run(
    judge: &dyn Judge,
    prompt: &str,
    out_dir: &Path,
    batch_index: usize,
    run: usize,
    runs: usize,
    timeout: Duration,
) -> anyhow::Result<(RunMeta, BTreeMap<u32, VerdictRecord>)> {
    let (answer_path, trace_path) = run_paths(out_dir, batch_index, run, runs);
    if answer_path.exists() {
        std::fs::remove_file(&answer_path)
            .with_context(|| format!("remove stale {:?}", answer_path))?;
    }

    let start = Instant::now();
    let outcome = judge.invoke(prompt, &answer_path, timeout).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    write_text(&trace_path, &outcome.trace)?;

    let answer = match tokio::fs::read(&answer_path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => {
            write_text(&answer_path, "")?;
            String::new()
        }
    };
    let parsed = parse_verdicts(&answer);
    emit_run_finished(batch_index, run, outcome.rc, parsed.parsed_lines, duration_ms);

    Ok((
        RunMeta {
            run,
            rc: outcome.rc,
            parsed_lines: parsed.parsed_lines,
            duration_ms,
        },
        parsed.verdicts,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semgate_core::{GatePolicy, SummaryConfig, VerdictCounts};

    fn outcome(valid: bool, counts: VerdictCounts) -> GateOutcome {
        let mut summary = GateSummary::assemble(
            SummaryHeader {
                run_id: Uuid::nil(),
                date: "2026-10-16".to_string(),
                generated_at: Utc::now(),
                batch_size: 8,
                total_tasks: 0,
                config: SummaryConfig {
                    consensus_runs: 1,
                    timeout_sec: 900,
                    model_reasoning_effort: "low".to_string(),
                    max_acceptance_items: 12,
                    max_prompt_chars: 60_000,
                    garbled_gate: "on".to_string(),
                    parallel_runs: false,
                },
            },
            BTreeMap::new(),
            Vec::new(),
            GatePolicy::new(1, 2),
        );
        summary.counts = counts;
        let errors = if valid {
            Vec::new()
        } else {
            vec!["bad".to_string()]
        };
        GateOutcome {
            out_dir: PathBuf::from("/out"),
            summary_path: PathBuf::from("/out/summary.json"),
            checked: CheckedSummary {
                value: serde_json::json!({ "status": if valid { "ok" } else { "fail" } }),
                errors,
            },
            summary,
        }
    }

    #[test]
    fn test_status_line_format() {
        let out = outcome(
            true,
            VerdictCounts {
                ok: 4,
                needs_fix: 1,
                unknown: 0,
            },
        );
        assert_eq!(
            out.status_line(),
            "SC_SEMANTIC_GATE_ALL status=ok needs_fix=1 unknown=0 limit_needs_fix=1 limit_unknown=2 out=/out"
        );
        assert_eq!(out.exit_code(), 0);
    }

    #[test]
    fn test_hard_failure_status_line() {
        let err = PipelineError::Config(ConfigError::ZeroBatchSize);
        assert_eq!(
            err.status_line(Path::new("/out")),
            "SC_SEMANTIC_GATE_ALL status=fail reason=config out=/out"
        );
        let err = PipelineError::Gate(GateError::TaskNotFound(3));
        assert_eq!(err.reason(), "store");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_status_line_schema_invalid() {
        let out = outcome(false, VerdictCounts::default());
        assert_eq!(
            out.status_line(),
            "SC_SEMANTIC_GATE_ALL status=fail reason=summary_schema_invalid out=/out"
        );
        assert_eq!(out.exit_code(), 1);
    }
}
