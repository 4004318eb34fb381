//! Threshold policy over aggregate verdict counts.

use serde::{Deserialize, Serialize};

/// Reason tag when too many tasks need fixing.
pub const NEEDS_FIX_EXCEEDED: &str = "needs_fix_exceeded";
/// Reason tag when too many tasks have no verdict.
pub const UNKNOWN_EXCEEDED: &str = "unknown_exceeded";

/// Tolerated counts. Zero means zero tolerance, which is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub max_needs_fix: u32,
    pub max_unknown: u32,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub failed: bool,
    /// One tag per exceeded threshold, in a fixed order.
    pub reasons: Vec<String>,
}

impl GatePolicy {
    pub fn new(max_needs_fix: u32, max_unknown: u32) -> Self {
        Self {
            max_needs_fix,
            max_unknown,
        }
    }

    /// Both thresholds are checked independently; both tags are reported when
    /// both trigger.
    pub fn evaluate(&self, needs_fix_count: usize, unknown_count: usize) -> PolicyDecision {
        let mut reasons = Vec::new();
        if needs_fix_count > self.max_needs_fix as usize {
            reasons.push(NEEDS_FIX_EXCEEDED.to_string());
        }
        if unknown_count > self.max_unknown as usize {
            reasons.push(UNKNOWN_EXCEEDED.to_string());
        }
        PolicyDecision {
            failed: !reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_fix_over_limit_fails() {
        let decision = GatePolicy::new(2, 0).evaluate(3, 0);
        assert!(decision.failed);
        assert_eq!(decision.reasons, vec![NEEDS_FIX_EXCEEDED]);
    }

    #[test]
    fn test_clean_counts_pass_any_threshold() {
        for (nf, unk) in [(0, 0), (0, 5), (3, 0), (10, 10)] {
            assert!(!GatePolicy::new(nf, unk).evaluate(0, 0).failed);
        }
    }

    #[test]
    fn test_default_is_zero_tolerance() {
        let policy = GatePolicy::default();
        assert!(policy.evaluate(0, 1).failed);
        assert!(policy.evaluate(1, 0).failed);
    }

    #[test]
    fn test_both_reasons_reported() {
        let decision = GatePolicy::new(1, 1).evaluate(2, 2);
        assert_eq!(decision.reasons, vec![NEEDS_FIX_EXCEEDED, UNKNOWN_EXCEEDED]);
    }

    #[test]
    fn test_at_limit_passes() {
        assert!(!GatePolicy::new(2, 3).evaluate(2, 3).failed);
    }
}
