//! Majority-vote reconciliation of independent judge runs.
//!
//! Consensus is a pure reduction over a fixed-size vote vector: it never
//! looks at how votes were produced, so it can be exercised without a judge.
//!
//! Rules:
//! - every task gets exactly one vote per run; a run that did not mention a
//!   task votes `Unknown` with reason [`NO_PARSEABLE_VERDICT`];
//! - `Unknown` votes count for neither side;
//! - more `OK` than `Needs Fix` wins `OK`, the reverse wins `Needs Fix`, and
//!   equal counts (including 0 = 0) yield `Unknown`;
//! - the reason is taken from the first run, by run index, whose verdict
//!   matches the outcome and whose reason is non-empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::verdict::{Verdict, VerdictRecord};

/// Reason recorded for a run that produced no line for a task.
pub const NO_PARSEABLE_VERDICT: &str = "no parseable verdict";
/// Reason recorded when no run supplied any reason for an `Unknown` outcome.
pub const NO_CONSENSUS_VERDICT: &str = "no consensus verdict";

/// Reconciled verdict for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub task_id: u32,
    pub verdict: Verdict,
    pub reason: String,
}

/// Vote counts for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub ok: usize,
    pub needs_fix: usize,
    pub unknown: usize,
}

impl VoteTally {
    pub fn count(votes: &[VerdictRecord]) -> Self {
        votes.iter().fold(Self::default(), |mut tally, vote| {
            match vote.verdict {
                Verdict::Ok => tally.ok += 1,
                Verdict::NeedsFix => tally.needs_fix += 1,
                Verdict::Unknown => tally.unknown += 1,
            }
            tally
        })
    }

    /// Winning verdict; ties resolve to `Unknown`.
    pub fn winner(&self) -> Verdict {
        use std::cmp::Ordering;
        match self.ok.cmp(&self.needs_fix) {
            Ordering::Greater => Verdict::Ok,
            Ordering::Less => Verdict::NeedsFix,
            Ordering::Equal => Verdict::Unknown,
        }
    }
}

/// Reduce an ordered vote vector (one vote per run) to a single record.
pub fn majority(votes: &[VerdictRecord]) -> VerdictRecord {
    let verdict = VoteTally::count(votes).winner();
    let first_reason = |pred: &dyn Fn(&VerdictRecord) -> bool| {
        votes
            .iter()
            .find(|v| pred(v) && !v.reason.is_empty())
            .map(|v| v.reason.clone())
    };

    let reason = first_reason(&|v: &VerdictRecord| v.verdict == verdict)
        .or_else(|| {
            if verdict == Verdict::Unknown {
                first_reason(&|_: &VerdictRecord| true)
            } else {
                None
            }
        })
        .unwrap_or_else(|| {
            if verdict == Verdict::Unknown {
                NO_CONSENSUS_VERDICT.to_string()
            } else {
                String::new()
            }
        });

    VerdictRecord::new(verdict, reason)
}

/// The vote of one run for one task, synthesising `Unknown` when the run
/// did not mention it.
pub fn vote_for(run: &BTreeMap<u32, VerdictRecord>, task_id: u32) -> VerdictRecord {
    run.get(&task_id)
        .cloned()
        .unwrap_or_else(|| VerdictRecord::new(Verdict::Unknown, NO_PARSEABLE_VERDICT))
}

/// Reconcile the parsed runs of one batch into one finding per task id,
/// in batch order. Verdicts for ids outside the batch are ignored.
pub fn reconcile(task_ids: &[u32], runs: &[BTreeMap<u32, VerdictRecord>]) -> Vec<Finding> {
    task_ids
        .iter()
        .map(|&task_id| {
            let votes: Vec<VerdictRecord> = runs.iter().map(|run| vote_for(run, task_id)).collect();
            let outcome = majority(&votes);
            Finding {
                task_id,
                verdict: outcome.verdict,
                reason: outcome.reason,
            }
        })
        .collect()
}
