//! Gate run configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use semgate_core::{GatePolicy, SummaryConfig, MIN_PROMPT_CEILING};

/// Configuration validation failure.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--batch-size must be > 0")]
    ZeroBatchSize,

    #[error("--consensus-runs must be > 0")]
    ZeroConsensusRuns,

    #[error("--max-acceptance-items must be > 0")]
    ZeroAcceptanceItems,

    #[error("unsupported reasoning effort `{0}` (expected low, medium or high)")]
    ReasoningEffort(String),

    #[error("unsupported garbled gate mode `{0}` (expected on or off)")]
    GarbledGate(String),
}

/// Reasoning effort forwarded to the judge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningEffort {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            other => Err(ConfigError::ReasoningEffort(other.to_string())),
        }
    }
}

/// Whether the garbled-text precheck runs before judging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GarbledGate {
    #[default]
    On,
    Off,
}

impl GarbledGate {
    pub fn as_str(self) -> &'static str {
        match self {
            GarbledGate::On => "on",
            GarbledGate::Off => "off",
        }
    }
}

impl FromStr for GarbledGate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(GarbledGate::On),
            "off" => Ok(GarbledGate::Off),
            other => Err(ConfigError::GarbledGate(other.to_string())),
        }
    }
}

/// Everything one gate run needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Repository root holding `.taskmaster/tasks`.
    pub repo_root: PathBuf,
    /// Artifact directory for this run.
    pub out_dir: PathBuf,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub consensus_runs: usize,
    pub reasoning_effort: ReasoningEffort,
    pub max_acceptance_items: usize,
    /// Requested prompt ceiling; see [`GateConfig::effective_prompt_ceiling`].
    pub max_prompt_chars: usize,
    /// Keep at most this many tasks after filtering; 0 keeps all.
    pub max_tasks: usize,
    pub max_needs_fix: u32,
    pub max_unknown: u32,
    pub garbled_gate: GarbledGate,
    /// Launch the consensus runs of a batch concurrently.
    pub parallel_runs: bool,
    /// Restrict the run to these ids when set.
    pub task_filter: Option<BTreeSet<u32>>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            out_dir: PathBuf::from("logs/ci/sc-semantic-gate-all"),
            batch_size: 8,
            timeout_secs: 900,
            consensus_runs: 1,
            reasoning_effort: ReasoningEffort::Low,
            max_acceptance_items: 12,
            max_prompt_chars: 60_000,
            max_tasks: 0,
            max_needs_fix: 0,
            max_unknown: 0,
            garbled_gate: GarbledGate::On,
            parallel_runs: false,
            task_filter: None,
        }
    }
}

impl GateConfig {
    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.consensus_runs == 0 {
            return Err(ConfigError::ZeroConsensusRuns);
        }
        if self.max_acceptance_items == 0 {
            return Err(ConfigError::ZeroAcceptanceItems);
        }
        Ok(())
    }

    /// Prompt ceiling actually enforced; never below [`MIN_PROMPT_CEILING`].
    pub fn effective_prompt_ceiling(&self) -> usize {
        self.max_prompt_chars.max(MIN_PROMPT_CEILING)
    }

    pub fn policy(&self) -> GatePolicy {
        GatePolicy::new(self.max_needs_fix, self.max_unknown)
    }

    /// The configuration block echoed into the summary.
    pub fn summary_config(&self) -> SummaryConfig {
        SummaryConfig {
            consensus_runs: self.consensus_runs,
            timeout_sec: self.timeout_secs,
            model_reasoning_effort: self.reasoning_effort.to_string(),
            max_acceptance_items: self.max_acceptance_items,
            max_prompt_chars: self.effective_prompt_ceiling(),
            garbled_gate: self.garbled_gate.as_str().to_string(),
            parallel_runs: self.parallel_runs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.timeout_secs, 900);
        assert_eq!(config.consensus_runs, 1);
        assert_eq!(config.reasoning_effort, ReasoningEffort::Low);
        assert_eq!(config.max_prompt_chars, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let mut config = GateConfig {
            batch_size: 0,
            ..GateConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatchSize));
        config.batch_size = 2;
        config.consensus_runs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroConsensusRuns));
        config.consensus_runs = 3;
        config.max_acceptance_items = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroAcceptanceItems));
    }

    #[test]
    fn test_prompt_ceiling_floor() {
        let config = GateConfig {
            max_prompt_chars: 500,
            ..GateConfig::default()
        };
        assert_eq!(config.effective_prompt_ceiling(), 3000);
        assert_eq!(config.summary_config().max_prompt_chars, 3000);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("HIGH".parse::<ReasoningEffort>(), Ok(ReasoningEffort::High));
        assert!("extreme".parse::<ReasoningEffort>().is_err());
        assert_eq!("off".parse::<GarbledGate>(), Ok(GarbledGate::Off));
        assert!("maybe".parse::<GarbledGate>().is_err());
    }
}
