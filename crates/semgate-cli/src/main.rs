//! semgate - semantic acceptance gate CLI
//!
//! The `semgate` command judges whether each task's acceptance set is
//! semantically equivalent to its description, using an external LLM judge
//! with majority-vote consensus.
//!
//! ## Commands
//!
//! - `run`: Run the full gate and print one status line
//! - `precheck`: Run only the garbled-text precheck
//! - `self-check`: Exercise parser, consensus, policy and summary contract
//!
//! Exit codes: 0 gate ok, 1 gate failed, 2 configuration or precondition
//! failure.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use semgate_ci::artifacts::{write_json, write_text};
use semgate_ci::pipeline::failure_status_line;
use semgate_ci::{
    default_out_dir, run_precheck, CodexJudge, GarbledGate, GateConfig, GatePipeline,
    JudgeConfig, PipelineError, ReasoningEffort, GATE_DIR_NAME, SELF_CHECK_DIR_NAME,
};
use semgate_core::{parse_task_ids_csv, run_self_check, IntegrityReport, JsonTaskStore};

const LOG_PREFIX: &str = "[sc-semantic-gate-all]";
const TOP_HITS_LIMIT: usize = 8;
const EXIT_PRECONDITION: i32 = 2;

#[derive(Parser)]
#[command(name = "semgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Consensus-based semantic acceptance gate", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the semantic gate over all (or the selected) tasks
    Run(RunArgs),

    /// Scan task text for decode errors and mojibake, without judging
    Precheck(ScopeArgs),

    /// Run the deterministic local self-check (no judge)
    SelfCheck {
        /// Repository root (artifacts go under logs/ci/<date>/)
        #[arg(long, env = "SEMGATE_REPO_ROOT", default_value = ".")]
        repo_root: PathBuf,

        /// Output directory (default: logs/ci/<date>/sc-semantic-gate-all-self-check)
        #[arg(long, env = "SEMGATE_OUT_DIR")]
        out_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ScopeArgs {
    /// Repository root holding .taskmaster/tasks
    #[arg(long, env = "SEMGATE_REPO_ROOT", default_value = ".")]
    repo_root: PathBuf,

    /// Output directory (default: logs/ci/<date>/sc-semantic-gate-all)
    #[arg(long, env = "SEMGATE_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Only these task ids (comma-separated, e.g. 1,14,22)
    #[arg(long, env = "SEMGATE_TASK_IDS", default_value = "")]
    task_ids: String,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Tasks per judge prompt
    #[arg(long, env = "SEMGATE_BATCH_SIZE", default_value_t = 8)]
    batch_size: usize,

    /// Timeout per judge run, in seconds
    #[arg(long, env = "SEMGATE_TIMEOUT_SEC", default_value_t = 900)]
    timeout_sec: u64,

    /// Independent judge runs per batch
    #[arg(long, env = "SEMGATE_CONSENSUS_RUNS", default_value_t = 1)]
    consensus_runs: usize,

    /// Judge reasoning effort (low, medium, high)
    #[arg(long, env = "SEMGATE_REASONING_EFFORT", default_value = "low")]
    model_reasoning_effort: ReasoningEffort,

    /// Acceptance items kept per view in a task brief
    #[arg(long, env = "SEMGATE_MAX_ACCEPTANCE_ITEMS", default_value_t = 12)]
    max_acceptance_items: usize,

    /// Prompt ceiling in characters (never below 3000)
    #[arg(long, env = "SEMGATE_MAX_PROMPT_CHARS", default_value_t = 60_000)]
    max_prompt_chars: usize,

    /// Keep at most N tasks after filtering (0 = all)
    #[arg(long, env = "SEMGATE_MAX_TASKS", default_value_t = 0)]
    max_tasks: usize,

    /// Tolerated Needs Fix findings
    #[arg(long, env = "SEMGATE_MAX_NEEDS_FIX", default_value_t = 0)]
    max_needs_fix: u32,

    /// Tolerated Unknown findings
    #[arg(long, env = "SEMGATE_MAX_UNKNOWN", default_value_t = 0)]
    max_unknown: u32,

    /// Garbled-text precheck (on, off)
    #[arg(long, env = "SEMGATE_GARBLED_GATE", default_value = "on")]
    garbled_gate: GarbledGate,

    /// Launch the consensus runs of a batch concurrently
    #[arg(long, env = "SEMGATE_PARALLEL_RUNS")]
    parallel_runs: bool,

    /// Judge executable
    #[arg(long, env = "SEMGATE_JUDGE_PROGRAM", default_value = "codex")]
    judge_program: String,
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

impl ScopeArgs {
    fn out_dir(&self, name: &str) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| default_out_dir(&self.repo_root, &today(), name))
    }

    fn gate_config(&self) -> GateConfig {
        let filter = parse_task_ids_csv(&self.task_ids);
        GateConfig {
            repo_root: self.repo_root.clone(),
            out_dir: self.out_dir(GATE_DIR_NAME),
            task_filter: (!filter.is_empty()).then_some(filter),
            ..GateConfig::default()
        }
    }
}

impl RunArgs {
    fn gate_config(&self) -> GateConfig {
        GateConfig {
            batch_size: self.batch_size,
            timeout_secs: self.timeout_sec,
            consensus_runs: self.consensus_runs,
            reasoning_effort: self.model_reasoning_effort,
            max_acceptance_items: self.max_acceptance_items,
            max_prompt_chars: self.max_prompt_chars,
            max_tasks: self.max_tasks,
            max_needs_fix: self.max_needs_fix,
            max_unknown: self.max_unknown,
            garbled_gate: self.garbled_gate,
            parallel_runs: self.parallel_runs,
            ..self.scope.gate_config()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    semgate_core::init_tracing(cli.json, level);
    info!(version = semgate_core::VERSION, "semgate starting");

    let code = match cli.command {
        Commands::Run(args) => cmd_run(&args).await?,
        Commands::Precheck(scope) => cmd_precheck(&scope)?,
        Commands::SelfCheck { repo_root, out_dir } => {
            let out_dir = out_dir
                .unwrap_or_else(|| default_out_dir(&repo_root, &today(), SELF_CHECK_DIR_NAME));
            cmd_self_check(&out_dir)?
        }
    };
    std::process::exit(code);
}

fn print_precheck_failure(report: &IntegrityReport) {
    println!(
        "{LOG_PREFIX} ERROR: garbled precheck failed decode_errors={} parse_errors={} suspicious_hits={}",
        report.summary.decode_errors, report.summary.parse_errors, report.summary.suspicious_hits
    );
    let hits = report.top_hits(TOP_HITS_LIMIT);
    if !hits.is_empty() {
        println!("{LOG_PREFIX} top garbled hits:");
        for line in hits {
            println!(" - {line}");
        }
    }
}

/// Run the gate and print its status line.
async fn cmd_run(args: &RunArgs) -> Result<i32> {
    let config = args.gate_config();
    let store = match JsonTaskStore::open(&config.repo_root) {
        Ok(store) => store,
        Err(e) => {
            println!("{LOG_PREFIX} ERROR: {e}");
            println!("{}", failure_status_line("store", &config.out_dir));
            return Ok(EXIT_PRECONDITION);
        }
    };
    let judge = CodexJudge::new(JudgeConfig {
        program: args.judge_program.clone(),
        reasoning_effort: config.reasoning_effort,
        repo_root: config.repo_root.clone(),
    });

    match GatePipeline::run(&store, &judge, &config).await {
        Ok(outcome) => {
            println!("{}", outcome.status_line());
            Ok(outcome.exit_code())
        }
        Err(PipelineError::Precheck(report)) => {
            print_precheck_failure(&report);
            println!("{}", failure_status_line("precheck", &config.out_dir));
            Ok(EXIT_PRECONDITION)
        }
        Err(e) => {
            println!("{LOG_PREFIX} ERROR: {e}");
            println!("{}", e.status_line(&config.out_dir));
            Ok(e.exit_code())
        }
    }
}

/// Run only the garbled-text precheck.
fn cmd_precheck(scope: &ScopeArgs) -> Result<i32> {
    let config = scope.gate_config();
    let store = match JsonTaskStore::open(&config.repo_root) {
        Ok(store) => store,
        Err(e) => {
            println!("{LOG_PREFIX} ERROR: {e}");
            return Ok(EXIT_PRECONDITION);
        }
    };
    let report = run_precheck(&store, &config).context("garbled precheck")?;
    if report.is_clean() {
        println!(
            "{LOG_PREFIX} garbled precheck ok scanned_tasks={} out={}",
            report.summary.scanned_tasks,
            config.out_dir.display()
        );
        Ok(0)
    } else {
        print_precheck_failure(&report);
        Ok(EXIT_PRECONDITION)
    }
}

/// Run the self-check and write its artifacts into `out_dir`.
fn cmd_self_check(out_dir: &Path) -> Result<i32> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("create {:?}", out_dir))?;
    let outcome = run_self_check();
    write_json(&out_dir.join("summary.json"), &outcome.payload)?;
    write_json(&out_dir.join("verdict.json"), &outcome.payload)?;
    write_text(&out_dir.join("report.md"), &outcome.report_md)?;
    println!(
        "SC_SEMANTIC_GATE_ALL_SELF_CHECK status={} out={}",
        if outcome.ok { "ok" } else { "fail" },
        out_dir.display()
    );
    Ok(if outcome.ok { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("semgate").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_run_defaults() {
        let Commands::Run(args) = parse(&["run", "--repo-root", "/repo"]).command else {
            panic!("expected run");
        };
        let config = args.gate_config();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.consensus_runs, 1);
        assert_eq!(config.reasoning_effort, ReasoningEffort::Low);
        assert_eq!(config.garbled_gate, GarbledGate::On);
        assert!(config.task_filter.is_none());
        assert!(config.out_dir.starts_with("/repo/logs/ci"));
        assert!(config.out_dir.ends_with(GATE_DIR_NAME));
    }

    #[test]
    fn test_run_overrides() {
        let Commands::Run(args) = parse(&[
            "run",
            "--task-ids",
            "T3, 14;22",
            "--batch-size",
            "2",
            "--consensus-runs",
            "3",
            "--model-reasoning-effort",
            "high",
            "--garbled-gate",
            "off",
            "--parallel-runs",
            "--out-dir",
            "/tmp/gate",
        ])
        .command
        else {
            panic!("expected run");
        };
        let config = args.gate_config();
        assert_eq!(
            config.task_filter.unwrap().into_iter().collect::<Vec<_>>(),
            vec![3, 14, 22]
        );
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.consensus_runs, 3);
        assert_eq!(config.reasoning_effort, ReasoningEffort::High);
        assert_eq!(config.garbled_gate, GarbledGate::Off);
        assert!(config.parallel_runs);
        assert_eq!(config.out_dir, PathBuf::from("/tmp/gate"));
    }

    #[test]
    fn test_bad_effort_rejected() {
        let result = Cli::try_parse_from(["semgate", "run", "--model-reasoning-effort", "max"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_self_check_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let code = cmd_self_check(dir.path()).unwrap();
        assert_eq!(code, 0);
        for file in ["summary.json", "verdict.json", "report.md"] {
            assert!(dir.path().join(file).exists());
        }
    }

    #[test]
    fn test_precheck_missing_store_is_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let scope = ScopeArgs {
            repo_root: dir.path().to_path_buf(),
            out_dir: Some(dir.path().join("out")),
            task_ids: String::new(),
        };
        assert_eq!(cmd_precheck(&scope).unwrap(), EXIT_PRECONDITION);
    }

    #[tokio::test]
    async fn test_run_missing_store_is_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().display().to_string();
        let Commands::Run(args) = parse(&["run", "--repo-root", &repo]).command else {
            panic!("expected run");
        };
        assert_eq!(cmd_run(&args).await.unwrap(), EXIT_PRECONDITION);
        assert_eq!(
            failure_status_line("store", Path::new("/out")),
            "SC_SEMANTIC_GATE_ALL status=fail reason=store out=/out"
        );
    }
}
