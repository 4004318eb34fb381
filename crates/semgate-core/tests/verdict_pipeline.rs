//! Integration tests chaining parse -> reconcile -> assemble -> contract.

use std::collections::BTreeMap;

use chrono::Utc;
use semgate_core::consensus::NO_PARSEABLE_VERDICT;
use semgate_core::policy::{NEEDS_FIX_EXCEEDED, UNKNOWN_EXCEEDED};
use semgate_core::summary::SUMMARY_SCHEMA_INVALID;
use semgate_core::{
    enforce_summary_contract, parse_verdicts, partition, reconcile, BatchMeta, Finding,
    GatePolicy, GateStatus, GateSummary, SummaryConfig, SummaryHeader, Verdict,
};
use uuid::Uuid;

fn header(total_tasks: usize, batch_size: usize, consensus_runs: usize) -> SummaryHeader {
    SummaryHeader {
        run_id: Uuid::new_v4(),
        date: "2026-10-16".to_string(),
        generated_at: Utc::now(),
        batch_size,
        total_tasks,
        config: SummaryConfig {
            consensus_runs,
            timeout_sec: 900,
            model_reasoning_effort: "low".to_string(),
            max_acceptance_items: 12,
            max_prompt_chars: 60_000,
            garbled_gate: "on".to_string(),
            parallel_runs: false,
        },
    }
}

fn meta(index: usize, ids: &[u32], runs: usize) -> BatchMeta {
    BatchMeta {
        batch_index: index,
        task_count: ids.len(),
        task_ids: ids.to_vec(),
        prompt_chars: 2000,
        prompt_trimmed: false,
        prompt_over_ceiling: false,
        task_brief_budget: 3200,
        runs,
        run_meta: Vec::new(),
    }
}

/// Judge answers per batch, one string per run.
fn judge_gate(
    ids: &[u32],
    batch_size: usize,
    runs: usize,
    answers: &[Vec<&str>],
    policy: GatePolicy,
) -> GateSummary {
    let batches = partition(ids, batch_size).unwrap();
    let mut findings: BTreeMap<u32, Finding> = BTreeMap::new();
    let mut batch_meta = Vec::new();
    for (batch, batch_answers) in batches.iter().zip(answers) {
        let parsed: Vec<_> = batch_answers
            .iter()
            .map(|a| parse_verdicts(a).verdicts)
            .collect();
        for f in reconcile(&batch.task_ids, &parsed) {
            findings.insert(f.task_id, f);
        }
        batch_meta.push(meta(batch.index, &batch.task_ids, runs));
    }
    GateSummary::assemble(
        header(ids.len(), batch_size, runs),
        findings,
        batch_meta,
        policy,
    )
}

#[test]
fn test_silent_batch_fails_gate_with_unknowns() {
    let answers = vec![
        vec!["T1\tOK\tcovered\nT2\tOK\tcovered\n"],
        vec![""],
        vec!["T5\tOK\tcovered\n"],
    ];
    let summary = judge_gate(&[1, 2, 3, 4, 5], 2, 1, &answers, GatePolicy::default());

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.unknown, vec![3, 4]);
    assert_eq!(summary.counts.ok, 3);
    assert_eq!(summary.status, GateStatus::Fail);
    assert_eq!(summary.fail_reasons, vec![UNKNOWN_EXCEEDED]);
    assert!(summary
        .findings
        .iter()
        .filter(|f| f.verdict == Verdict::Unknown)
        .all(|f| f.reason == NO_PARSEABLE_VERDICT));

    let checked = enforce_summary_contract(serde_json::to_value(&summary).unwrap());
    assert!(checked.is_valid(), "{:?}", checked.errors);
    assert_eq!(checked.status(), GateStatus::Fail);
}

#[test]
fn test_three_run_consensus_passes_gate() {
    let answers = vec![vec![
        "T10\tOK\tfine\nT11\tNeeds Fix\tno error path\n",
        "T10\tOK\tfine\nT11\tOK\tacceptable\n",
        "T10\tNeeds Fix\tunclear\nT11\tOK\tacceptable\n",
    ]];
    let summary = judge_gate(&[10, 11], 8, 3, &answers, GatePolicy::default());

    assert_eq!(summary.counts.ok, 2);
    assert!(summary.needs_fix.is_empty());
    assert_eq!(summary.status, GateStatus::Ok);
    assert_eq!(summary.findings[1].reason, "acceptable");
    assert!(enforce_summary_contract(serde_json::to_value(&summary).unwrap()).is_valid());
}

#[test]
fn test_needs_fix_over_threshold() {
    let answers = vec![vec!["T1\tNeeds Fix\ta\nT2\tNeeds Fix\tb\nT3\tNeeds Fix\tc\n"]];
    let summary = judge_gate(&[1, 2, 3], 5, 1, &answers, GatePolicy::new(2, 0));
    assert_eq!(summary.status, GateStatus::Fail);
    assert_eq!(summary.fail_reasons, vec![NEEDS_FIX_EXCEEDED]);
    assert_eq!(summary.needs_fix, vec![1, 2, 3]);
}

#[test]
fn test_tampered_summary_forced_to_fail() {
    let answers = vec![vec!["T1\tOK\tfine\n"]];
    let summary = judge_gate(&[1], 1, 1, &answers, GatePolicy::default());
    assert_eq!(summary.status, GateStatus::Ok);

    let mut value = serde_json::to_value(&summary).unwrap();
    value["unknown"] = serde_json::json!([1]);
    let checked = enforce_summary_contract(value);

    assert!(!checked.is_valid());
    assert_eq!(checked.status(), GateStatus::Fail);
    assert_eq!(checked.value["status"], "fail");
    let reasons = checked.value["fail_reasons"].as_array().unwrap();
    assert!(reasons.iter().any(|r| r == SUMMARY_SCHEMA_INVALID));
    assert!(!checked.value["summary_errors"].as_array().unwrap().is_empty());
}
