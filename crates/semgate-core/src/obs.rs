//! Structured observability hooks for gate lifecycle events.
//!
//! This module provides:
//! - A gate-scoped tracing span via [`gate_span`]
//! - Emission functions for batch start, judge run completion and the final
//!   gate evaluation
//!
//! Events are emitted at `info!` level; filter with `RUST_LOG`.

use tracing::{info, warn};

/// Span tagged with the gate run id. Attach it to the gate future with
/// `tracing::Instrument` so every event below carries `run_id`.
///
/// # Example
///
/// ```ignore
/// run_batches(..).instrument(gate_span("8b0f4c2e-...")).await
/// ```
pub fn gate_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("semgate.gate", run_id = %run_id)
}

/// Emit event: a batch is about to be judged.
pub fn emit_batch_started(
    batch_index: usize,
    batches: usize,
    runs: usize,
    tasks: usize,
    prompt_chars: usize,
) {
    info!(
        event = "batch.started",
        batch = batch_index,
        batches = batches,
        runs = runs,
        tasks = tasks,
        prompt_chars = prompt_chars,
    );
}

/// Emit event: one judge run finished.
pub fn emit_run_finished(
    batch_index: usize,
    run: usize,
    rc: i32,
    parsed_lines: usize,
    duration_ms: u64,
) {
    if rc == 0 {
        info!(
            event = "run.finished",
            batch = batch_index,
            run = run,
            rc = rc,
            parsed_lines = parsed_lines,
            duration_ms = duration_ms,
        );
    } else {
        warn!(
            event = "run.failed",
            batch = batch_index,
            run = run,
            rc = rc,
            parsed_lines = parsed_lines,
            duration_ms = duration_ms,
        );
    }
}

/// Emit event: policy evaluated over the reconciled findings.
pub fn emit_gate_evaluated(status: &str, needs_fix: usize, unknown: usize) {
    info!(
        event = "gate.evaluated",
        status = %status,
        needs_fix = needs_fix,
        unknown = unknown,
    );
}

/// Emit event: the garbled-text precheck rejected the task text.
pub fn emit_precheck_failed(decode_errors: usize, parse_errors: usize, suspicious_hits: usize) {
    warn!(
        event = "precheck.failed",
        decode_errors = decode_errors,
        parse_errors = parse_errors,
        suspicious_hits = suspicious_hits,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_span_create() {
        let _entered = gate_span("test-run-id").entered();
        emit_batch_started(1, 2, 1, 8, 4000);
        emit_run_finished(1, 1, 124, 0, 900_000);
        emit_gate_evaluated("fail", 0, 8);
    }
}
