//! Task brief rendering.
//!
//! A brief is the bounded-length text block a judge sees for one task. Every
//! field is truncated independently at character boundaries, and acceptance
//! items lose their `Refs:` clause: file references are metadata, not
//! behaviour, and must not steer the semantic verdict.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::task::{Task, TaskView};

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

const MASTER_DESCRIPTION_CHARS: usize = 400;
const MASTER_DETAILS_CHARS: usize = 800;
const VIEW_DESCRIPTION_CHARS: usize = 400;
const MAX_OVERLAY_REFS: usize = 12;
const MAX_CONTRACT_REFS: usize = 20;
const MAX_LABELS: usize = 20;

/// Limits applied when rendering one brief.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BriefLimits {
    /// Maximum acceptance items taken from each view.
    pub max_acceptance_items: usize,
    /// Character budget for the whole brief.
    pub max_chars: usize,
}

/// Truncate `text` to at most `max_chars` characters, ending in [`ELLIPSIS`]
/// when anything was cut. Never splits a multi-byte character.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = ELLIPSIS.chars().count();
    if max_chars < marker_len {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - marker_len).collect();
    out.push_str(ELLIPSIS);
    out
}

fn refs_clause() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\brefs\s*:").expect("static regex"))
}

/// Drop a trailing `Refs: <paths>` clause and collapse whitespace.
pub fn strip_refs_clause(text: &str) -> String {
    let trimmed = text.trim();
    let kept = match refs_clause().find(trimmed) {
        Some(m) => &trimmed[..m.start()],
        None => trimmed,
    };
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn view_acceptance(view: Option<&TaskView>, max_items: usize) -> Vec<String> {
    view.map(|v| {
        v.acceptance
            .iter()
            .map(|a| strip_refs_clause(a))
            .filter(|a| !a.is_empty())
            .take(max_items)
            .collect()
    })
    .unwrap_or_default()
}

fn union_tags<'a>(
    back: Option<&'a TaskView>,
    gameplay: Option<&'a TaskView>,
    pick: impl Fn(&'a TaskView) -> &'a [String],
) -> Vec<&'a str> {
    let set: BTreeSet<&str> = back
        .into_iter()
        .chain(gameplay)
        .flat_map(|v| pick(v).iter().map(String::as_str))
        .collect();
    set.into_iter().collect()
}

fn tag_line(name: &str, tags: &[&str], cap: usize) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let shown = tags.iter().take(cap).copied().collect::<Vec<_>>().join(", ");
    let more = if tags.len() > cap { " ..." } else { "" };
    Some(format!("- {name}: {shown}{more}"))
}

/// Render one task brief under `limits`.
pub fn render_brief(task: &Task, limits: BriefLimits) -> String {
    let back = task.back.as_ref();
    let gameplay = task.gameplay.as_ref();
    let view_description = |v: Option<&TaskView>| {
        truncate_chars(
            v.map(|v| v.description.as_str()).unwrap_or_default(),
            VIEW_DESCRIPTION_CHARS,
        )
    };

    let mut lines = vec![
        format!("### Task {}: {}", task.id, task.title.trim()),
        format!(
            "- master.description: {}",
            truncate_chars(&task.description, MASTER_DESCRIPTION_CHARS)
        ),
        format!(
            "- master.details: {}",
            truncate_chars(&task.details, MASTER_DETAILS_CHARS)
        ),
        format!("- back.description: {}", view_description(back)),
        format!("- gameplay.description: {}", view_description(gameplay)),
    ];

    let overlay = union_tags(back, gameplay, |v| v.overlay_refs.as_slice());
    let contracts = union_tags(back, gameplay, |v| v.contract_refs.as_slice());
    let labels = union_tags(back, gameplay, |v| v.labels.as_slice());
    lines.extend(tag_line("overlay_refs", &overlay, MAX_OVERLAY_REFS));
    lines.extend(tag_line("contractRefs", &contracts, MAX_CONTRACT_REFS));
    lines.extend(tag_line("labels", &labels, MAX_LABELS));

    let back_acc = view_acceptance(back, limits.max_acceptance_items);
    let gameplay_acc = view_acceptance(gameplay, limits.max_acceptance_items);
    for (view, items) in [("back", &back_acc), ("gameplay", &gameplay_acc)] {
        if items.is_empty() {
            continue;
        }
        lines.push(format!("- acceptance (view={view}):"));
        lines.extend(items.iter().map(|a| format!("  - {a}")));
    }
    if back_acc.is_empty() && gameplay_acc.is_empty() {
        lines.push("- acceptance: (missing in both views)".to_string());
    }

    truncate_chars(lines.join("\n").trim(), limits.max_chars)
}
