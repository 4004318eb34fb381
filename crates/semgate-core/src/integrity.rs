//! Garbled-text precheck over the task store.
//!
//! A semantic verdict on mojibake is meaningless, so the gate refuses to build
//! any batch while the task text shows decode errors, parse errors or
//! suspicious content. The scan runs in three layers:
//! 1. strict UTF-8 decode of every store document (BOMs are flagged too);
//! 2. JSON parse of every decodable document;
//! 3. mojibake and control-character rules over every text field of every
//!    task in scope.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::brief::truncate_chars;
use crate::task::TaskStore;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";
const SAMPLE_CHARS: usize = 160;

struct Rule {
    kind: &'static str,
    pattern: Regex,
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            ("replacement_char", "\u{FFFD}"),
            ("latin1_utf8_mix", "(?:Ã.|Â.|â€™|â€œ|â€|ï»¿)"),
            ("gbk_token", "锟斤拷"),
            (
                "cjk_mojibake_cluster",
                "[闂侀柣閻熼崡閳х紓婵為柛閹槐閿涚粭闁块崐紒濠礭]{2,}",
            ),
            ("control_chars", r"[\x00-\x08\x0B\x0C\x0E-\x1F]"),
        ]
        .into_iter()
        .map(|(kind, pattern)| Rule {
            kind,
            pattern: Regex::new(pattern).expect("static regex"),
        })
        .collect()
    })
}

/// Which layer produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitClass {
    DecodeError,
    ParseError,
    Suspicious,
}

/// One integrity problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityHit {
    pub class: HitClass,
    /// Document name for decode/parse errors, `T<id>` for task fields.
    pub source: String,
    pub field: Option<String>,
    pub kind: String,
    pub sample: String,
}

impl IntegrityHit {
    /// One-line rendering used in diagnostics.
    pub fn render(&self) -> String {
        let location = match &self.field {
            Some(field) => format!("{}:{}", self.source, field),
            None => self.source.clone(),
        };
        format!("{location} | {} | {}", self.kind, self.sample)
    }
}

/// Aggregate counters; any non-zero counter fails the precheck.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub scanned_documents: usize,
    pub scanned_tasks: usize,
    pub decode_errors: usize,
    pub parse_errors: usize,
    pub suspicious_hits: usize,
}

/// Full precheck report, written as `garbled-precheck.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub generated_at: DateTime<Utc>,
    pub task_filter: Option<Vec<u32>>,
    pub summary: IntegritySummary,
    pub hits: Vec<IntegrityHit>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        let s = &self.summary;
        s.decode_errors == 0 && s.parse_errors == 0 && s.suspicious_hits == 0
    }

    /// The first `limit` hits, decode and parse errors first.
    pub fn top_hits(&self, limit: usize) -> Vec<String> {
        let mut hits: Vec<&IntegrityHit> = self.hits.iter().collect();
        hits.sort_by_key(|h| match h.class {
            HitClass::DecodeError => 0,
            HitClass::ParseError => 1,
            HitClass::Suspicious => 2,
        });
        hits.into_iter().take(limit).map(IntegrityHit::render).collect()
    }

    fn push(&mut self, hit: IntegrityHit) {
        match hit.class {
            HitClass::DecodeError => self.summary.decode_errors += 1,
            HitClass::ParseError => self.summary.parse_errors += 1,
            HitClass::Suspicious => self.summary.suspicious_hits += 1,
        }
        self.hits.push(hit);
    }
}

fn sample_of(text: &str) -> String {
    truncate_chars(&text.trim().escape_debug().to_string(), SAMPLE_CHARS)
}

/// Scan the store's documents and the text of every task in scope.
/// `filter` restricts the task-level scan; documents are always checked.
pub fn scan_task_text(store: &dyn TaskStore, filter: Option<&BTreeSet<u32>>) -> IntegrityReport {
    let mut report = IntegrityReport {
        generated_at: Utc::now(),
        task_filter: filter.map(|f| f.iter().copied().collect()),
        summary: IntegritySummary::default(),
        hits: Vec::new(),
    };

    let mut documents_ok = true;
    for doc in store.raw_documents() {
        report.summary.scanned_documents += 1;
        if doc.bytes.starts_with(UTF8_BOM) {
            report.push(IntegrityHit {
                class: HitClass::Suspicious,
                source: doc.name.clone(),
                field: None,
                kind: "utf8_bom".to_string(),
                sample: "UTF-8 BOM is forbidden".to_string(),
            });
        }
        let text = match std::str::from_utf8(&doc.bytes) {
            Ok(text) => text,
            Err(e) => {
                documents_ok = false;
                report.push(IntegrityHit {
                    class: HitClass::DecodeError,
                    source: doc.name.clone(),
                    field: None,
                    kind: "not_utf8".to_string(),
                    sample: e.to_string(),
                });
                continue;
            }
        };
        let body = text.trim_start_matches('\u{FEFF}');
        if let Err(e) = serde_json::from_str::<serde_json::Value>(body) {
            documents_ok = false;
            report.push(IntegrityHit {
                class: HitClass::ParseError,
                source: doc.name.clone(),
                field: None,
                kind: "invalid_json".to_string(),
                sample: e.to_string(),
            });
        }
    }
    if !documents_ok {
        return report;
    }

    let ids = match store.task_ids() {
        Ok(ids) => ids,
        Err(e) => {
            report.push(IntegrityHit {
                class: HitClass::ParseError,
                source: "task store".to_string(),
                field: None,
                kind: "task_ids".to_string(),
                sample: e.to_string(),
            });
            return report;
        }
    };

    for id in ids.into_iter().filter(|id| filter.map_or(true, |f| f.contains(id))) {
        let task = match store.resolve(id) {
            Ok(task) => task,
            Err(e) => {
                report.push(IntegrityHit {
                    class: HitClass::ParseError,
                    source: format!("T{id}"),
                    field: None,
                    kind: "resolve".to_string(),
                    sample: e.to_string(),
                });
                continue;
            }
        };
        report.summary.scanned_tasks += 1;
        for (field, text) in task.text_fields() {
            for rule in rules() {
                if let Some(m) = rule.pattern.find(text) {
                    report.push(IntegrityHit {
                        class: HitClass::Suspicious,
                        source: format!("T{id}"),
                        field: Some(field.clone()),
                        kind: format!("mojibake_{}", rule.kind),
                        sample: sample_of(&text[m.start()..]),
                    });
                }
            }
        }
    }
    report
}
