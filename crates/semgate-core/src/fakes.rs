//! In-memory fakes for the task store (testing only)
//!
//! `MemoryTaskStore` satisfies the [`TaskStore`] contract without touching
//! the filesystem. Its raw documents are rendered in the same layout the
//! JSON store reads, so the integrity precheck sees realistic bytes.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::error::{GateError, Result};
use crate::task::{RawDocument, Task, TaskStore, TaskView};

/// In-memory task store backed by a `BTreeMap<id, Task>`.
#[derive(Debug, Clone, Default)]
pub struct MemoryTaskStore {
    tasks: BTreeMap<u32, Task>,
    /// Ids reported by `task_ids` that fail to resolve.
    dangling: Vec<u32>,
    extra_documents: Vec<RawDocument>,
}

impl MemoryTaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.id, t)).collect(),
            ..Self::default()
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.insert(task.id, task);
        self
    }

    /// List `id` without being able to resolve it.
    pub fn with_dangling_id(mut self, id: u32) -> Self {
        self.dangling.push(id);
        self
    }

    /// Append an arbitrary document to the scanned set.
    pub fn with_raw_document(mut self, doc: RawDocument) -> Self {
        self.extra_documents.push(doc);
        self
    }

    fn view_document(&self, pick: impl Fn(&Task) -> Option<&TaskView>) -> Value {
        let entries: Vec<Value> = self
            .tasks
            .values()
            .filter_map(|task| {
                let view = pick(task)?;
                Some(json!({
                    "taskmaster_id": task.id,
                    "description": view.description,
                    "acceptance": view.acceptance,
                    "labels": view.labels,
                    "overlay_refs": view.overlay_refs,
                    "contractRefs": view.contract_refs,
                }))
            })
            .collect();
        Value::Array(entries)
    }
}

impl TaskStore for MemoryTaskStore {
    fn task_ids(&self) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = self.tasks.keys().copied().collect();
        ids.extend(self.dangling.iter().copied());
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn resolve(&self, id: u32) -> Result<Task> {
        self.tasks.get(&id).cloned().ok_or(GateError::TaskNotFound(id))
    }

    fn raw_documents(&self) -> Vec<RawDocument> {
        let master: Vec<Value> = self
            .tasks
            .values()
            .map(|t| {
                json!({
                    "id": t.id,
                    "title": t.title,
                    "description": t.description,
                    "details": t.details,
                })
            })
            .collect();
        let render = |name: &str, value: Value| RawDocument {
            name: name.to_string(),
            bytes: serde_json::to_vec_pretty(&value).unwrap_or_default(),
        };

        let mut docs = vec![
            render("tasks.json", json!({ "master": { "tasks": master } })),
            render("tasks_back.json", self.view_document(|t| t.back.as_ref())),
            render(
                "tasks_gameplay.json",
                self.view_document(|t| t.gameplay.as_ref()),
            ),
        ];
        docs.extend(self.extra_documents.iter().cloned());
        docs
    }
}
