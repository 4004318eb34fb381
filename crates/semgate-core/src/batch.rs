//! Task id selection and batch partitioning.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// An ordered, non-empty group of task ids judged together in one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based position of the batch in the run.
    pub index: usize,
    pub task_ids: Vec<u32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.task_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_ids.is_empty()
    }
}

/// Parse a task id filter such as `1,14, 22` or `T3;T4`.
///
/// Tokens may be separated by commas, semicolons or whitespace and may carry a
/// `T` prefix. Tokens that are not ids are ignored.
pub fn parse_task_ids_csv(raw: &str) -> BTreeSet<u32> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|t| t.trim_start_matches(['T', 't']).parse().ok())
        .collect()
}

/// Apply the optional id filter, then keep at most `max_tasks` ids
/// (`0` keeps all). Input order is preserved.
pub fn select_task_ids(all: &[u32], filter: Option<&BTreeSet<u32>>, max_tasks: usize) -> Vec<u32> {
    let selected = all
        .iter()
        .copied()
        .filter(|id| filter.map_or(true, |f| f.contains(id)));
    if max_tasks > 0 {
        selected.take(max_tasks).collect()
    } else {
        selected.collect()
    }
}

/// Split `ids` into consecutive batches of at most `batch_size` ids.
pub fn partition(ids: &[u32], batch_size: usize) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(GateError::InvalidConfig(
            "batch size must be > 0".to_string(),
        ));
    }
    Ok(ids
        .chunks(batch_size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            index: i + 1,
            task_ids: chunk.to_vec(),
        })
        .collect())
}
