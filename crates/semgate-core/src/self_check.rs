//! Deterministic local self-check of the verdict machinery.
//!
//! Runs canned inputs through the parser, consensus, policy and summary
//! contract without invoking a judge. Used to smoke-test a deployment before
//! trusting a real gate run.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::consensus::{majority, reconcile, NO_PARSEABLE_VERDICT};
use crate::policy::{GatePolicy, NEEDS_FIX_EXCEEDED};
use crate::summary::{
    enforce_summary_contract, GateSummary, SummaryConfig, SummaryHeader, SUMMARY_SCHEMA_INVALID,
};
use crate::verdict::{parse_verdicts, Verdict, VerdictRecord};

/// Command name recorded in the self-check payload.
pub const SELF_CHECK_CMD: &str = "sc-semantic-gate-all-self-check";

/// One named self-check assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &str, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            ok,
            detail: detail.into(),
        }
    }
}

/// Aggregate self-check result.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfCheckOutcome {
    pub ok: bool,
    pub checks: Vec<CheckResult>,
    /// JSON payload written as `summary.json` and `verdict.json`.
    pub payload: Value,
    /// Markdown report written as `report.md`.
    pub report_md: String,
}

fn check_parser() -> CheckResult {
    let answer = "Results follow\nT1\tOK\tcovered\nT2\\tNeeds Fix\\tmissing retry path\n\
                  T3\tPerhaps\twhatever\nnot a verdict line\nT4\n";
    let parsed = parse_verdicts(answer);
    let expected: BTreeMap<u32, VerdictRecord> = [
        (1, VerdictRecord::new(Verdict::Ok, "covered")),
        (2, VerdictRecord::new(Verdict::NeedsFix, "missing retry path")),
        (3, VerdictRecord::new(Verdict::Unknown, "whatever")),
    ]
    .into_iter()
    .collect();
    let ok = parsed.verdicts == expected && parsed.parsed_lines == 3;
    CheckResult::new(
        "parser",
        ok,
        format!(
            "parsed_lines={} ids={:?}",
            parsed.parsed_lines,
            parsed.verdicts.keys().collect::<Vec<_>>()
        ),
    )
}

fn check_consensus() -> CheckResult {
    let ok = |r: &str| VerdictRecord::new(Verdict::Ok, r);
    let nf = |r: &str| VerdictRecord::new(Verdict::NeedsFix, r);
    let unk = |r: &str| VerdictRecord::new(Verdict::Unknown, r);

    let cases = [
        (vec![ok("a"), ok("b"), nf("c")], Verdict::Ok),
        (vec![ok("a"), nf("b")], Verdict::Unknown),
        (vec![unk(""), unk(""), unk("")], Verdict::Unknown),
        (vec![unk(""), nf("gap"), unk("")], Verdict::NeedsFix),
    ];
    let mut failures = Vec::new();
    for (i, (votes, expected)) in cases.iter().enumerate() {
        let got = majority(votes).verdict;
        if got != *expected {
            failures.push(format!("case {i}: expected {expected}, got {got}"));
        }
    }

    let silent = reconcile(&[7, 8], &[BTreeMap::new()]);
    let silent_ok = silent.len() == 2
        && silent
            .iter()
            .all(|f| f.verdict == Verdict::Unknown && f.reason == NO_PARSEABLE_VERDICT);
    if !silent_ok {
        failures.push("empty run did not yield Unknown for every task".to_string());
    }

    let detail = if failures.is_empty() {
        format!("{} vote vectors reconciled", cases.len() + 1)
    } else {
        failures.join("; ")
    };
    CheckResult::new("consensus", failures.is_empty(), detail)
}

fn check_policy() -> CheckResult {
    let over = GatePolicy::new(2, 0).evaluate(3, 0);
    let clean = GatePolicy::default().evaluate(0, 0);
    let ok = over.failed && over.reasons == [NEEDS_FIX_EXCEEDED] && !clean.failed;
    CheckResult::new(
        "policy",
        ok,
        format!("over_limit_reasons={:?} clean_failed={}", over.reasons, clean.failed),
    )
}

fn canned_summary() -> Value {
    let header = SummaryHeader {
        run_id: Uuid::nil(),
        date: Utc::now().format("%Y-%m-%d").to_string(),
        generated_at: Utc::now(),
        batch_size: 2,
        total_tasks: 2,
        config: SummaryConfig {
            consensus_runs: 1,
            timeout_sec: 0,
            model_reasoning_effort: "low".to_string(),
            max_acceptance_items: 12,
            max_prompt_chars: 3000,
            garbled_gate: "off".to_string(),
            parallel_runs: false,
        },
    };
    let runs = vec![parse_verdicts("T1\tOK\tcovered\nT2\tNeeds Fix\tgap\n").verdicts];
    let findings = reconcile(&[1, 2], &runs)
        .into_iter()
        .map(|f| (f.task_id, f))
        .collect();
    let summary = GateSummary::assemble(header, findings, Vec::new(), GatePolicy::new(1, 0));
    serde_json::to_value(summary).unwrap_or(Value::Null)
}

fn check_validator() -> CheckResult {
    let good = canned_summary();
    let good_checked = enforce_summary_contract(good.clone());

    let mut tampered = good;
    tampered["needs_fix"] = json!([]);
    let bad_checked = enforce_summary_contract(tampered);
    let bad_rejected = !bad_checked.is_valid()
        && bad_checked.value["fail_reasons"]
            .as_array()
            .is_some_and(|r| r.iter().any(|v| v == SUMMARY_SCHEMA_INVALID));

    CheckResult::new(
        "summary_contract",
        good_checked.is_valid() && bad_rejected,
        format!(
            "good_errors={} tampered_errors={}",
            good_checked.errors.len(),
            bad_checked.errors.len()
        ),
    )
}

fn render_report(ok: bool, checks: &[CheckResult]) -> String {
    let mut out = String::from("# Semantic gate self-check\n\n");
    out.push_str(&format!("- status: {}\n\n", if ok { "ok" } else { "fail" }));
    out.push_str("| check | result | detail |\n|---|---|---|\n");
    for c in checks {
        let mark = if c.ok { "ok" } else { "FAIL" };
        out.push_str(&format!("| {} | {} | {} |\n", c.name, mark, c.detail));
    }
    out
}

/// Run every self-check.
pub fn run_self_check() -> SelfCheckOutcome {
    let checks = vec![
        check_parser(),
        check_consensus(),
        check_policy(),
        check_validator(),
    ];
    let ok = checks.iter().all(|c| c.ok);
    let payload = json!({
        "cmd": SELF_CHECK_CMD,
        "generated_at": Utc::now(),
        "status": if ok { "ok" } else { "fail" },
        "checks": checks,
    });
    let report_md = render_report(ok, &checks);
    SelfCheckOutcome {
        ok,
        checks,
        payload,
        report_md,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_check_passes() {
        let outcome = run_self_check();
        for c in &outcome.checks {
            assert!(c.ok, "{} failed: {}", c.name, c.detail);
        }
        assert!(outcome.ok);
        assert_eq!(outcome.payload["status"], "ok");
        assert_eq!(outcome.payload["checks"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_report_lists_every_check() {
        let outcome = run_self_check();
        for name in ["parser", "consensus", "policy", "summary_contract"] {
            assert!(outcome.report_md.contains(&format!("| {name} | ok |")));
        }
    }

    #[test]
    fn test_canned_summary_is_valid() {
        let value = canned_summary();
        assert_eq!(value["status"], "ok");
        assert!(enforce_summary_contract(value).is_valid());
    }
}
