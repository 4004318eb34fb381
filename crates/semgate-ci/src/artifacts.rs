//! Run artifact layout and writers.
//!
//! Every gate run owns one output directory. Per-run judge artifacts are
//! named `batch-NN.tsv` / `batch-NN.trace.log`, with a `-run-MM` suffix when
//! a batch is judged more than once.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Artifact directory name of a gate run.
pub const GATE_DIR_NAME: &str = "sc-semantic-gate-all";
/// Artifact directory name of the self-check.
pub const SELF_CHECK_DIR_NAME: &str = "sc-semantic-gate-all-self-check";

pub const SUMMARY_FILE: &str = "summary.json";
pub const SUMMARY_DIGEST_FILE: &str = "summary.digest";
pub const PRECHECK_FILE: &str = "garbled-precheck.json";

/// `<repo_root>/logs/ci/<date>/<name>`.
pub fn default_out_dir(repo_root: &Path, date: &str, name: &str) -> PathBuf {
    repo_root.join("logs").join("ci").join(date).join(name)
}

/// File stem for one judge run.
pub fn run_stem(batch_index: usize, run: usize, runs: usize) -> String {
    if runs > 1 {
        format!("batch-{batch_index:02}-run-{run:02}")
    } else {
        format!("batch-{batch_index:02}")
    }
}

/// Answer file (`.tsv`) and trace file (`.trace.log`) of one judge run.
pub fn run_paths(out_dir: &Path, batch_index: usize, run: usize, runs: usize) -> (PathBuf, PathBuf) {
    let stem = run_stem(batch_index, run, runs);
    (
        out_dir.join(format!("{stem}.tsv")),
        out_dir.join(format!("{stem}.trace.log")),
    )
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("serialize artifact")?;
    std::fs::write(path, content + "\n").with_context(|| format!("write {:?}", path))?;
    Ok(())
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `summary.json` and its `summary.digest` into `out_dir`.
/// Returns the summary path.
pub fn write_summary(out_dir: &Path, summary: &serde_json::Value) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("create {:?}", out_dir))?;
    let path = out_dir.join(SUMMARY_FILE);
    let mut json = serde_json::to_vec_pretty(summary).context("serialize summary")?;
    json.push(b'\n');
    std::fs::write(&path, &json).with_context(|| format!("write {:?}", path))?;
    std::fs::write(out_dir.join(SUMMARY_DIGEST_FILE), sha256_hex(&json))
        .context("write summary digest")?;
    Ok(path)
}

/// Check `summary.json` against `summary.digest`.
pub fn verify_summary_digest(out_dir: &Path) -> Result<bool> {
    let json = std::fs::read(out_dir.join(SUMMARY_FILE)).context("read summary")?;
    let digest = std::fs::read_to_string(out_dir.join(SUMMARY_DIGEST_FILE))
        .context("read summary digest")?;
    Ok(digest.trim() == sha256_hex(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_paths() {
        let dir = Path::new("/out");
        let (tsv, trace) = run_paths(dir, 3, 1, 1);
        assert_eq!(tsv, Path::new("/out/batch-03.tsv"));
        assert_eq!(trace, Path::new("/out/batch-03.trace.log"));

        let (tsv, _) = run_paths(dir, 12, 2, 3);
        assert_eq!(tsv, Path::new("/out/batch-12-run-02.tsv"));
    }

    #[test]
    fn test_default_out_dir() {
        let dir = default_out_dir(Path::new("/repo"), "2026-10-16", GATE_DIR_NAME);
        assert_eq!(
            dir,
            Path::new("/repo/logs/ci/2026-10-16/sc-semantic-gate-all")
        );
    }

    #[test]
    fn test_summary_digest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let path = write_summary(&out, &json!({"status": "ok"})).unwrap();
        assert!(path.ends_with(SUMMARY_FILE));
        assert!(verify_summary_digest(&out).unwrap());

        std::fs::write(&path, b"{\"status\":\"fail\"}").unwrap();
        assert!(!verify_summary_digest(&out).unwrap());
    }
}
