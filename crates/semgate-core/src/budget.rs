//! Prompt assembly under a global character ceiling.
//!
//! The judge has a finite context window, so a batch prompt trades per-task
//! detail for batch size: the per-task brief budget shrinks in a bounded,
//! deterministic loop until the rendered prompt fits.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::brief::{render_brief, BriefLimits};
use crate::task::Task;

/// Fixed instructions that open every batch prompt.
pub const PROMPT_HEADER: &str = r#"Role: semantic-equivalence-auditor (batch)

Goal: for every task below, decide whether its acceptance set is semantically equivalent to the task description.
Scope: semantic review only. Do NOT re-run deterministic checks (reference existence, anchors, ADR/security/static scans).
Important: reference paths have been removed from acceptance items on purpose; never infer requirements from test file names or paths.

Output format (STRICT, no markdown fences):
exactly one TSV line per task:
T<id>\tOK|Needs Fix\t<short reason (<=120 chars)>

Rules:
- OK when the acceptance set covers every REQUIRED behaviour, invariant and failure semantic implied by the master description/details, and contradicts none of them.
- Refinements consistent with the task intent are fine; never answer Needs Fix only because acceptance is more detailed.
- Needs Fix only for: missing described behaviour, a contradiction, or a clearly unrelated feature.
- When a task has both back and gameplay acceptance, judge their union.
- When back/gameplay descriptions conflict with master, master wins.
- When unsure, answer OK (do not guess).

Tasks:"#;

/// Per-task brief budget tried first.
pub const DEFAULT_TASK_BRIEF_BUDGET: usize = 3200;
/// Lower bound for the first proportional budget.
pub const PROPORTIONAL_BUDGET_FLOOR: usize = 250;
/// Absolute per-task floor used as the last resort.
pub const MIN_TASK_BRIEF_BUDGET: usize = 120;
/// Multiplicative shrink applied per iteration.
pub const SHRINK_FACTOR: f64 = 0.8;
/// Upper bound on shrink iterations.
pub const MAX_SHRINK_ITERATIONS: usize = 6;
/// Smallest global ceiling accepted from configuration.
pub const MIN_PROMPT_CEILING: usize = 3000;

/// A batch prompt plus how it was fitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FittedPrompt {
    pub prompt: String,
    /// Prompt length in characters.
    pub chars: usize,
    /// True when the per-task budget went below the default.
    pub trimmed: bool,
    /// Per-task budget used for the returned prompt.
    pub task_brief_budget: usize,
    /// True when even the floor budget could not fit the ceiling.
    pub over_ceiling: bool,
    /// Every budget rendered, in order. Non-increasing.
    pub budgets_tried: Vec<usize>,
}

/// Render the full prompt for `tasks` with every brief capped at
/// `task_brief_budget` characters.
pub fn build_batch_prompt(
    tasks: &[Task],
    max_acceptance_items: usize,
    task_brief_budget: usize,
) -> String {
    let limits = BriefLimits {
        max_acceptance_items,
        max_chars: task_brief_budget,
    };
    let mut blocks = vec![PROMPT_HEADER.to_string(), String::new()];
    for task in tasks {
        blocks.push(render_brief(task, limits));
        blocks.push(String::new());
    }
    let mut prompt = blocks.join("\n").trim().to_string();
    prompt.push('\n');
    prompt
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Fit `tasks` into one prompt of at most `ceiling` characters.
///
/// Returns the untouched default rendering when it fits. Otherwise starts
/// from a proportional share of the ceiling and shrinks by [`SHRINK_FACTOR`]
/// for at most [`MAX_SHRINK_ITERATIONS`] renders, then forces
/// [`MIN_TASK_BRIEF_BUDGET`]. If the floor rendering still exceeds the
/// ceiling the result is flagged with `over_ceiling`.
pub fn fit_prompt(tasks: &[Task], max_acceptance_items: usize, ceiling: usize) -> FittedPrompt {
    let render = |budget: usize| build_batch_prompt(tasks, max_acceptance_items, budget);
    let done = |prompt: String, trimmed: bool, budget: usize, budgets_tried: Vec<usize>| {
        let chars = char_len(&prompt);
        FittedPrompt {
            prompt,
            chars,
            trimmed,
            task_brief_budget: budget,
            over_ceiling: chars > ceiling,
            budgets_tried,
        }
    };

    let prompt = render(DEFAULT_TASK_BRIEF_BUDGET);
    let mut budgets_tried = vec![DEFAULT_TASK_BRIEF_BUDGET];
    if char_len(&prompt) <= ceiling {
        return done(prompt, false, DEFAULT_TASK_BRIEF_BUDGET, budgets_tried);
    }

    let header_len = char_len(&render_header_only(max_acceptance_items));
    let share = ceiling.saturating_sub(header_len) / tasks.len().max(1);
    let mut budget = share
        .max(PROPORTIONAL_BUDGET_FLOOR)
        .min(DEFAULT_TASK_BRIEF_BUDGET);

    for iteration in 0..MAX_SHRINK_ITERATIONS {
        let prompt = render(budget);
        budgets_tried.push(budget);
        let chars = char_len(&prompt);
        debug!(iteration, budget, chars, ceiling, "prompt budget iteration");
        if chars <= ceiling {
            return done(prompt, true, budget, budgets_tried);
        }
        budget = ((budget as f64 * SHRINK_FACTOR) as usize).max(MIN_TASK_BRIEF_BUDGET);
    }

    let prompt = render(MIN_TASK_BRIEF_BUDGET);
    budgets_tried.push(MIN_TASK_BRIEF_BUDGET);
    let fitted = done(prompt, true, MIN_TASK_BRIEF_BUDGET, budgets_tried);
    if fitted.over_ceiling {
        warn!(
            chars = fitted.chars,
            ceiling,
            tasks = tasks.len(),
            "prompt exceeds ceiling even at the floor budget"
        );
    }
    fitted
}

fn render_header_only(max_acceptance_items: usize) -> String {
    build_batch_prompt(&[], max_acceptance_items, DEFAULT_TASK_BRIEF_BUDGET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskView;

    fn big_task(id: u32) -> Task {
        Task::new(id, format!("Task {id}"), "d".repeat(400), "x".repeat(800)).with_back(
            TaskView {
                acceptance: (0..12).map(|i| format!("{i} {}", "a".repeat(200))).collect(),
                ..TaskView::default()
            },
        )
    }

    #[test]
    fn test_prompt_layout() {
        let tasks = vec![Task::new(1, "One", "d", ""), Task::new(2, "Two", "d", "")];
        let prompt = build_batch_prompt(&tasks, 12, 3200);
        assert!(prompt.starts_with(PROMPT_HEADER));
        assert!(prompt.contains("Tasks:\n\n### Task 1: One"));
        assert!(prompt.contains("\n\n### Task 2: Two"));
        assert!(prompt.ends_with("(missing in both views)\n"));
    }

    #[test]
    fn test_header_contains_escaped_tab_format() {
        assert!(PROMPT_HEADER.contains(r"T<id>\tOK|Needs Fix\t"));
    }

    #[test]
    fn test_small_batch_is_untrimmed() {
        let tasks = vec![Task::new(1, "One", "short", "")];
        let fitted = fit_prompt(&tasks, 12, 60_000);
        assert!(!fitted.trimmed);
        assert!(!fitted.over_ceiling);
        assert_eq!(fitted.task_brief_budget, DEFAULT_TASK_BRIEF_BUDGET);
        assert_eq!(fitted.budgets_tried, vec![DEFAULT_TASK_BRIEF_BUDGET]);
    }

    #[test]
    fn test_large_batch_is_trimmed_to_ceiling() {
        let tasks: Vec<Task> = (1..=8).map(big_task).collect();
        let ceiling = 8_000;
        let fitted = fit_prompt(&tasks, 12, ceiling);
        assert!(fitted.trimmed);
        assert!(!fitted.over_ceiling);
        assert!(fitted.chars <= ceiling);
        assert_eq!(fitted.chars, fitted.prompt.chars().count());
        assert!(fitted.task_brief_budget < DEFAULT_TASK_BRIEF_BUDGET);
    }

    #[test]
    fn test_budgets_are_non_increasing() {
        let tasks: Vec<Task> = (1..=30).map(big_task).collect();
        let fitted = fit_prompt(&tasks, 12, 3_000);
        for pair in fitted.budgets_tried.windows(2) {
            assert!(pair[1] <= pair[0], "budgets grew: {:?}", fitted.budgets_tried);
        }
        assert!(fitted.budgets_tried.len() <= MAX_SHRINK_ITERATIONS + 2);
    }

    #[test]
    fn test_floor_overflow_is_flagged() {
        let tasks: Vec<Task> = (1..=60).map(big_task).collect();
        let fitted = fit_prompt(&tasks, 12, 3_000);
        assert!(fitted.trimmed);
        assert!(fitted.over_ceiling);
        assert_eq!(fitted.task_brief_budget, MIN_TASK_BRIEF_BUDGET);
        assert_eq!(fitted.budgets_tried.last(), Some(&MIN_TASK_BRIEF_BUDGET));
    }

    #[test]
    fn test_fitting_is_deterministic() {
        let tasks: Vec<Task> = (1..=10).map(big_task).collect();
        assert_eq!(fit_prompt(&tasks, 12, 5_000), fit_prompt(&tasks, 12, 5_000));
    }
}
