//! Judge verdicts and the tolerant TSV answer parser.
//!
//! Judge output is untrusted free text. The parser is total: any input yields
//! a (possibly empty) mapping, and a malformed verdict token still produces an
//! `Unknown` record for its task rather than disappearing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum characters kept from a judge-supplied reason.
pub const MAX_REASON_CHARS: usize = 120;

/// Semantic verdict for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Needs Fix")]
    NeedsFix,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Verdict {
    /// Wire token, as written by the judge and in the summary.
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::NeedsFix => "Needs Fix",
            Verdict::Unknown => "Unknown",
        }
    }

    /// Map a judge token onto a verdict. Anything outside the allowed set is
    /// `Unknown`.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "OK" => Verdict::Ok,
            "Needs Fix" => Verdict::NeedsFix,
            _ => Verdict::Unknown,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed judge line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub verdict: Verdict,
    pub reason: String,
}

impl VerdictRecord {
    pub fn new(verdict: Verdict, reason: impl Into<String>) -> Self {
        Self {
            verdict,
            reason: reason.into(),
        }
    }
}

/// Result of parsing one judge answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAnswer {
    /// Task id to verdict; last line wins for duplicates.
    pub verdicts: BTreeMap<u32, VerdictRecord>,
    /// Number of lines that produced a record, duplicates included.
    pub parsed_lines: usize,
}

/// Parse a judge answer of `T<id>\t<verdict>\t<reason>` lines.
///
/// Literal `\t` sequences are treated as tabs. Lines that do not start with
/// the `T` marker, lack a verdict column, or carry a non-numeric id are
/// skipped.
pub fn parse_verdicts(text: &str) -> ParsedAnswer {
    let mut answer = ParsedAnswer::default();
    for raw in text.lines() {
        let line = raw.trim();
        if !line.starts_with('T') {
            continue;
        }
        let line = line.replace("\\t", "\t");
        let mut parts = line.split('\t');
        let Some(marker) = parts.next() else { continue };
        let Some(token) = parts.next() else { continue };
        let Ok(task_id) = marker.trim_start_matches('T').trim().parse::<u32>() else {
            continue;
        };
        let reason: String = parts
            .next()
            .map(str::trim)
            .unwrap_or_default()
            .chars()
            .take(MAX_REASON_CHARS)
            .collect();

        answer
            .verdicts
            .insert(task_id, VerdictRecord::new(Verdict::from_token(token), reason));
        answer.parsed_lines += 1;
    }
    answer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_lines() {
        let parsed = parse_verdicts("T1\tOK\tcovered\nT2\tNeeds Fix\tmissing failure path\n");
        assert_eq!(parsed.parsed_lines, 2);
        assert_eq!(parsed.verdicts[&1], VerdictRecord::new(Verdict::Ok, "covered"));
        assert_eq!(parsed.verdicts[&2].verdict, Verdict::NeedsFix);
    }

    #[test]
    fn test_parse_escaped_tabs() {
        let parsed = parse_verdicts(r"T7\tOK\tfine");
        assert_eq!(parsed.verdicts[&7], VerdictRecord::new(Verdict::Ok, "fine"));
    }

    #[test]
    fn test_reason_is_optional() {
        let parsed = parse_verdicts("T4\tOK");
        assert_eq!(parsed.verdicts[&4], VerdictRecord::new(Verdict::Ok, ""));
    }

    #[test]
    fn test_unknown_token_coerced() {
        let parsed = parse_verdicts("T5\tMaybe\tunsure\nT6\tok\tlowercase");
        assert_eq!(parsed.verdicts[&5].verdict, Verdict::Unknown);
        assert_eq!(parsed.verdicts[&5].reason, "unsure");
        assert_eq!(parsed.verdicts[&6].verdict, Verdict::Unknown);
    }

    #[test]
    fn test_non_marker_and_short_lines_skipped() {
        let text = "Here are the results:\n```\nT\tOK\nTx\tOK\nT9\n  T3\tOK\tindented\n";
        let parsed = parse_verdicts(text);
        assert_eq!(parsed.parsed_lines, 1);
        assert_eq!(parsed.verdicts.keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_duplicates_last_wins() {
        let parsed = parse_verdicts("T1\tOK\tfirst\nT1\tNeeds Fix\tsecond");
        assert_eq!(parsed.parsed_lines, 2);
        assert_eq!(
            parsed.verdicts[&1],
            VerdictRecord::new(Verdict::NeedsFix, "second")
        );
    }

    #[test]
    fn test_reason_capped() {
        let text = format!("T1\tOK\t{}", "r".repeat(300));
        let parsed = parse_verdicts(&text);
        assert_eq!(parsed.verdicts[&1].reason.chars().count(), MAX_REASON_CHARS);
    }

    #[test]
    fn test_parser_is_total_on_garbage() {
        let garbage = String::from_utf8_lossy(&[0xff, 0xfe, b'T', 0x00, b'\t', 0x80, b'\n', b'T'])
            .into_owned();
        for input in ["", "\n\n\t\t", "T\t\t\t", "T99999999999\tOK", garbage.as_str()] {
            let parsed = parse_verdicts(input);
            assert!(parsed
                .verdicts
                .values()
                .all(|r| matches!(r.verdict, Verdict::Ok | Verdict::NeedsFix | Verdict::Unknown)));
        }
        assert!(parse_verdicts("").verdicts.is_empty());
    }

    #[test]
    fn test_verdict_serde_tokens() {
        assert_eq!(serde_json::to_string(&Verdict::NeedsFix).unwrap(), "\"Needs Fix\"");
        let back: Verdict = serde_json::from_str("\"OK\"").unwrap();
        assert_eq!(back, Verdict::Ok);
    }
}
