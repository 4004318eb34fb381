//! Gate summary report and its structural contract.
//!
//! The summary is authoritative only after [`enforce_summary_contract`] has
//! checked it. A structurally unsound summary is forced to `fail` with the
//! [`SUMMARY_SCHEMA_INVALID`] reason and the individual validation errors
//! attached; it is still emitted for post-mortem.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::consensus::Finding;
use crate::policy::GatePolicy;
use crate::verdict::Verdict;

/// Command name recorded in every summary.
pub const GATE_CMD: &str = "sc-semantic-gate-all";
/// Reason tag appended when the summary fails validation.
pub const SUMMARY_SCHEMA_INVALID: &str = "summary_schema_invalid";

const REQUIRED_KEYS: &[&str] = &[
    "cmd",
    "date",
    "batches",
    "batch_size",
    "total_tasks",
    "counts",
    "needs_fix",
    "unknown",
    "findings",
    "max_needs_fix",
    "max_unknown",
    "fail_reasons",
    "status",
    "config",
    "batch_meta",
];

/// Final gate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Ok,
    Fail,
}

impl GateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GateStatus::Ok => "ok",
            GateStatus::Fail => "fail",
        }
    }
}

/// Audit record for one judge invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    /// 1-based run index within the batch.
    pub run: usize,
    /// Judge return code (127 not found, 124 timeout, 1 spawn failure).
    pub rc: i32,
    pub parsed_lines: usize,
    pub duration_ms: u64,
}

/// Audit record for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMeta {
    pub batch_index: usize,
    pub task_count: usize,
    pub task_ids: Vec<u32>,
    pub prompt_chars: usize,
    pub prompt_trimmed: bool,
    pub prompt_over_ceiling: bool,
    pub task_brief_budget: usize,
    pub runs: usize,
    pub run_meta: Vec<RunMeta>,
}

/// Counts by verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub ok: usize,
    pub needs_fix: usize,
    pub unknown: usize,
}

/// Configuration echoed into the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub consensus_runs: usize,
    pub timeout_sec: u64,
    pub model_reasoning_effort: String,
    pub max_acceptance_items: usize,
    pub max_prompt_chars: usize,
    pub garbled_gate: String,
    pub parallel_runs: bool,
}

/// Run-level facts that are not derived from findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryHeader {
    pub run_id: Uuid,
    pub date: String,
    pub generated_at: DateTime<Utc>,
    pub batch_size: usize,
    pub total_tasks: usize,
    pub config: SummaryConfig,
}

/// The final gate report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSummary {
    pub cmd: String,
    pub run_id: Uuid,
    pub date: String,
    pub generated_at: DateTime<Utc>,
    pub batches: usize,
    pub batch_size: usize,
    pub total_tasks: usize,
    pub counts: VerdictCounts,
    pub needs_fix: Vec<u32>,
    pub unknown: Vec<u32>,
    pub findings: Vec<Finding>,
    pub max_needs_fix: u32,
    pub max_unknown: u32,
    pub fail_reasons: Vec<String>,
    pub status: GateStatus,
    pub config: SummaryConfig,
    pub batch_meta: Vec<BatchMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summary_errors: Vec<String>,
}

impl GateSummary {
    /// Assemble the summary from reconciled findings and apply `policy`.
    ///
    /// Findings are ordered by task id; counts and id lists are derived from
    /// them so they agree by construction.
    pub fn assemble(
        header: SummaryHeader,
        findings: BTreeMap<u32, Finding>,
        batch_meta: Vec<BatchMeta>,
        policy: GatePolicy,
    ) -> Self {
        let findings: Vec<Finding> = findings.into_values().collect();
        let ids_with = |verdict: Verdict| -> Vec<u32> {
            findings
                .iter()
                .filter(|f| f.verdict == verdict)
                .map(|f| f.task_id)
                .collect()
        };
        let needs_fix = ids_with(Verdict::NeedsFix);
        let unknown = ids_with(Verdict::Unknown);
        let counts = VerdictCounts {
            ok: ids_with(Verdict::Ok).len(),
            needs_fix: needs_fix.len(),
            unknown: unknown.len(),
        };
        let decision = policy.evaluate(counts.needs_fix, counts.unknown);

        Self {
            cmd: GATE_CMD.to_string(),
            run_id: header.run_id,
            date: header.date,
            generated_at: header.generated_at,
            batches: batch_meta.len(),
            batch_size: header.batch_size,
            total_tasks: header.total_tasks,
            counts,
            needs_fix,
            unknown,
            findings,
            max_needs_fix: policy.max_needs_fix,
            max_unknown: policy.max_unknown,
            status: if decision.failed {
                GateStatus::Fail
            } else {
                GateStatus::Ok
            },
            fail_reasons: decision.reasons,
            config: header.config,
            batch_meta,
            summary_errors: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Structural contract
// ---------------------------------------------------------------------------

/// A summary after contract enforcement.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedSummary {
    pub value: Value,
    pub errors: Vec<String>,
}

impl CheckedSummary {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Final status as written in the checked summary.
    pub fn status(&self) -> GateStatus {
        match self.value.get("status").and_then(Value::as_str) {
            Some("ok") if self.is_valid() => GateStatus::Ok,
            _ => GateStatus::Fail,
        }
    }
}

fn non_negative_int(value: Option<&Value>) -> Option<u64> {
    value.and_then(Value::as_u64)
}

fn id_list(root: &Value, key: &str, errors: &mut Vec<String>) -> Option<Vec<u64>> {
    let Some(items) = root.get(key).and_then(Value::as_array) else {
        errors.push(format!("`{key}` must be an array"));
        return None;
    };
    let ids: Vec<u64> = items.iter().filter_map(Value::as_u64).collect();
    if ids.len() != items.len() {
        errors.push(format!("`{key}` must contain only non-negative integer task ids"));
    }
    Some(ids)
}

/// Check the structural contract of a serialized summary. Returns every
/// violation found; an empty list means the summary is valid.
pub fn validate_summary(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(root) = value.as_object() else {
        return vec!["summary must be a JSON object".to_string()];
    };

    for key in REQUIRED_KEYS {
        if !root.contains_key(*key) {
            errors.push(format!("missing required key `{key}`"));
        }
    }

    for key in ["batches", "batch_size", "total_tasks", "max_needs_fix", "max_unknown"] {
        if root.contains_key(key) && non_negative_int(root.get(key)).is_none() {
            errors.push(format!("`{key}` must be a non-negative integer"));
        }
    }

    let counts = root.get("counts");
    let count = |name: &str, errors: &mut Vec<String>| -> Option<u64> {
        let c = non_negative_int(counts.and_then(|c| c.get(name)));
        if c.is_none() {
            errors.push(format!("`counts.{name}` must be a non-negative integer"));
        }
        c
    };
    let ok_count = count("ok", &mut errors);
    let needs_fix_count = count("needs_fix", &mut errors);
    let unknown_count = count("unknown", &mut errors);

    let mut finding_verdicts: BTreeMap<u64, &str> = BTreeMap::new();
    match root.get("findings").and_then(Value::as_array) {
        Some(findings) => {
            for (i, f) in findings.iter().enumerate() {
                let id = non_negative_int(f.get("task_id"));
                let verdict = f.get("verdict").and_then(Value::as_str);
                match (id, verdict) {
                    (Some(id), Some(v @ ("OK" | "Needs Fix" | "Unknown"))) => {
                        if finding_verdicts.insert(id, v).is_some() {
                            errors.push(format!("duplicate finding for task {id}"));
                        }
                    }
                    (None, _) => errors.push(format!("`findings[{i}].task_id` is invalid")),
                    (Some(_), _) => errors.push(format!("`findings[{i}].verdict` is invalid")),
                }
                if !f.get("reason").is_some_and(Value::is_string) {
                    errors.push(format!("`findings[{i}].reason` must be a string"));
                }
            }
        }
        None => errors.push("`findings` must be an array".to_string()),
    }

    for (key, expected_verdict, expected_count) in [
        ("needs_fix", "Needs Fix", needs_fix_count),
        ("unknown", "Unknown", unknown_count),
    ] {
        let Some(ids) = id_list(value, key, &mut errors) else {
            continue;
        };
        if let Some(n) = expected_count {
            if ids.len() as u64 != n {
                errors.push(format!(
                    "`{key}` lists {} task(s) but `counts.{key}` is {n}",
                    ids.len()
                ));
            }
        }
        let unique: BTreeSet<u64> = ids.iter().copied().collect();
        if unique.len() != ids.len() {
            errors.push(format!("`{key}` contains duplicate task ids"));
        }
        for id in ids {
            match finding_verdicts.get(&id) {
                Some(v) if *v == expected_verdict => {}
                Some(v) => errors.push(format!(
                    "task {id} listed in `{key}` but its finding verdict is {v}"
                )),
                None => errors.push(format!("task {id} listed in `{key}` has no finding")),
            }
        }
    }

    if let Some(n) = ok_count {
        let ok_findings = finding_verdicts.values().filter(|v| **v == "OK").count() as u64;
        if ok_findings != n {
            errors.push(format!(
                "`counts.ok` is {n} but findings contain {ok_findings} OK verdict(s)"
            ));
        }
    }

    match root.get("fail_reasons").and_then(Value::as_array) {
        Some(reasons) if reasons.iter().all(Value::is_string) => {}
        _ => errors.push("`fail_reasons` must be an array of strings".to_string()),
    }

    match root.get("status").and_then(Value::as_str) {
        Some("ok") => {
            let over = |count: Option<u64>, limit: &str| {
                matches!((count, non_negative_int(root.get(limit))), (Some(c), Some(l)) if c > l)
            };
            if over(needs_fix_count, "max_needs_fix") || over(unknown_count, "max_unknown") {
                errors.push("`status` is ok but counts exceed thresholds".to_string());
            }
        }
        Some("fail") => {}
        _ => errors.push("`status` must be one of ok, fail".to_string()),
    }

    match (
        root.get("batch_meta").and_then(Value::as_array),
        non_negative_int(root.get("batches")),
    ) {
        (Some(meta), Some(n)) if meta.len() as u64 != n => errors.push(format!(
            "`batch_meta` has {} entries but `batches` is {n}",
            meta.len()
        )),
        (None, _) => errors.push("`batch_meta` must be an array".to_string()),
        _ => {}
    }

    errors
}

/// Validate `value` and, on any violation, force `status = fail`, append
/// [`SUMMARY_SCHEMA_INVALID`] to `fail_reasons` and attach `summary_errors`.
pub fn enforce_summary_contract(mut value: Value) -> CheckedSummary {
    let errors = validate_summary(&value);
    if errors.is_empty() {
        return CheckedSummary { value, errors };
    }

    if !value.is_object() {
        value = serde_json::json!({ "original": value });
    }
    if let Some(root) = value.as_object_mut() {
        root.insert("status".to_string(), Value::from(GateStatus::Fail.as_str()));
        let mut reasons: Vec<Value> = root
            .get("fail_reasons")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        reasons.push(Value::from(SUMMARY_SCHEMA_INVALID));
        root.insert("fail_reasons".to_string(), Value::Array(reasons));
        root.insert(
            "summary_errors".to_string(),
            Value::from(errors.clone()),
        );
    }
    CheckedSummary { value, errors }
}
