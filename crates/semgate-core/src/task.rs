//! Task model and the read-only task store boundary.
//!
//! A task is resolved as a triplet: the `master` entry (title, description,
//! details) plus two optional views (`back`, `gameplay`) that carry the
//! acceptance statements and tag lists judged by the gate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GateError, Result};

/// Master task document, relative to the repository root.
pub const MASTER_TASKS_PATH: &str = ".taskmaster/tasks/tasks.json";
/// Back view document, relative to the repository root.
pub const BACK_VIEW_PATH: &str = ".taskmaster/tasks/tasks_back.json";
/// Gameplay view document, relative to the repository root.
pub const GAMEPLAY_VIEW_PATH: &str = ".taskmaster/tasks/tasks_gameplay.json";

/// One perspective on a task that contributes acceptance items and tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub description: String,
    pub acceptance: Vec<String>,
    pub labels: Vec<String>,
    pub overlay_refs: Vec<String>,
    pub contract_refs: Vec<String>,
}

/// A task as seen by the gate. Owned by the external store; read-only here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub details: String,
    pub back: Option<TaskView>,
    pub gameplay: Option<TaskView>,
}

impl Task {
    /// Create a task with master fields only.
    pub fn new(
        id: u32,
        title: impl Into<String>,
        description: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            details: details.into(),
            back: None,
            gameplay: None,
        }
    }

    pub fn with_back(mut self, view: TaskView) -> Self {
        self.back = Some(view);
        self
    }

    pub fn with_gameplay(mut self, view: TaskView) -> Self {
        self.gameplay = Some(view);
        self
    }

    /// Every free-text field of the task, labelled by its path.
    pub fn text_fields(&self) -> Vec<(String, &str)> {
        let mut out = vec![
            ("master.title".to_string(), self.title.as_str()),
            ("master.description".to_string(), self.description.as_str()),
            ("master.details".to_string(), self.details.as_str()),
        ];
        for (name, view) in [("back", &self.back), ("gameplay", &self.gameplay)] {
            let Some(view) = view else { continue };
            out.push((format!("{name}.description"), view.description.as_str()));
            for (i, item) in view.acceptance.iter().enumerate() {
                out.push((format!("{name}.acceptance[{i}]"), item.as_str()));
            }
            for (i, item) in view.labels.iter().enumerate() {
                out.push((format!("{name}.labels[{i}]"), item.as_str()));
            }
            for (i, item) in view.overlay_refs.iter().enumerate() {
                out.push((format!("{name}.overlay_refs[{i}]"), item.as_str()));
            }
            for (i, item) in view.contract_refs.iter().enumerate() {
                out.push((format!("{name}.contractRefs[{i}]"), item.as_str()));
            }
        }
        out
    }
}

/// Raw bytes of one store document, as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Read-only lookup of tasks by identifier.
pub trait TaskStore: Send + Sync {
    /// All known task ids, sorted ascending and deduplicated.
    fn task_ids(&self) -> Result<Vec<u32>>;

    /// Resolve one task. An unknown id is an error for that id only.
    fn resolve(&self, id: u32) -> Result<Task>;

    /// The raw documents backing the store, for integrity scanning.
    fn raw_documents(&self) -> Vec<RawDocument>;
}

// ---------------------------------------------------------------------------
// JSON-backed store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TaskIndex {
    master: HashMap<u32, Value>,
    back: HashMap<u32, Value>,
    gameplay: HashMap<u32, Value>,
}

/// Task store over the `.taskmaster/tasks/*.json` documents.
///
/// Documents are read eagerly but decoded lazily, so an integrity precheck can
/// report undecodable documents before any lookup fails on them.
#[derive(Debug)]
pub struct JsonTaskStore {
    master: RawDocument,
    back: Option<RawDocument>,
    gameplay: Option<RawDocument>,
    index: OnceLock<std::result::Result<TaskIndex, String>>,
}

impl JsonTaskStore {
    /// Open the store rooted at `repo_root`. The master document is required;
    /// view documents are optional.
    pub fn open(repo_root: &Path) -> Result<Self> {
        let master_path = repo_root.join(MASTER_TASKS_PATH);
        let master = read_document(&master_path)?.ok_or_else(|| {
            GateError::TaskStore(format!("missing task document: {}", master_path.display()))
        })?;
        Ok(Self {
            master,
            back: read_document(&repo_root.join(BACK_VIEW_PATH))?,
            gameplay: read_document(&repo_root.join(GAMEPLAY_VIEW_PATH))?,
            index: OnceLock::new(),
        })
    }

    /// Build a store from in-memory documents.
    pub fn from_documents(
        master: RawDocument,
        back: Option<RawDocument>,
        gameplay: Option<RawDocument>,
    ) -> Self {
        Self {
            master,
            back,
            gameplay,
            index: OnceLock::new(),
        }
    }

    fn index(&self) -> Result<&TaskIndex> {
        self.index
            .get_or_init(|| self.build_index())
            .as_ref()
            .map_err(|e| GateError::TaskStore(e.clone()))
    }

    fn build_index(&self) -> std::result::Result<TaskIndex, String> {
        let master_doc = parse_document(&self.master)?;
        let tasks = master_doc
            .get("master")
            .and_then(|m| m.get("tasks"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut index = TaskIndex::default();
        for entry in tasks {
            if !entry.is_object() {
                continue;
            }
            if let Some(id) = entry.get("id").and_then(value_as_task_id) {
                index.master.insert(id, entry);
            }
        }
        if let Some(doc) = &self.back {
            index.back = view_entries(&parse_document(doc)?);
        }
        if let Some(doc) = &self.gameplay {
            index.gameplay = view_entries(&parse_document(doc)?);
        }
        Ok(index)
    }
}

impl TaskStore for JsonTaskStore {
    fn task_ids(&self) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = self.index()?.master.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn resolve(&self, id: u32) -> Result<Task> {
        let index = self.index()?;
        let master = index.master.get(&id).ok_or(GateError::TaskNotFound(id))?;
        Ok(Task {
            id,
            title: str_field(master, "title"),
            description: str_field(master, "description"),
            details: str_field(master, "details"),
            back: index.back.get(&id).map(view_from_entry),
            gameplay: index.gameplay.get(&id).map(view_from_entry),
        })
    }

    fn raw_documents(&self) -> Vec<RawDocument> {
        let mut docs = vec![self.master.clone()];
        docs.extend(self.back.iter().cloned());
        docs.extend(self.gameplay.iter().cloned());
        docs
    }
}

fn read_document(path: &Path) -> Result<Option<RawDocument>> {
    if !path.is_file() {
        return Ok(None);
    }
    Ok(Some(RawDocument {
        name: path.to_string_lossy().replace('\\', "/"),
        bytes: std::fs::read(path)?,
    }))
}

fn parse_document(doc: &RawDocument) -> std::result::Result<Value, String> {
    let text = std::str::from_utf8(&doc.bytes)
        .map_err(|e| format!("{} is not valid UTF-8: {}", doc.name, e))?;
    serde_json::from_str(text).map_err(|e| format!("{} is not valid JSON: {}", doc.name, e))
}

/// View documents are either a bare array or an object with a `tasks` array;
/// entries are keyed by `taskmaster_id`.
fn view_entries(doc: &Value) -> HashMap<u32, Value> {
    let entries = match doc {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("tasks")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };
    entries
        .iter()
        .filter(|e| e.is_object())
        .filter_map(|e| {
            let id = e.get("taskmaster_id").and_then(value_as_task_id)?;
            Some((id, e.clone()))
        })
        .collect()
}

fn view_from_entry(entry: &Value) -> TaskView {
    TaskView {
        description: str_field(entry, "description"),
        acceptance: list_field(entry, "acceptance"),
        labels: list_field(entry, "labels"),
        overlay_refs: list_field(entry, "overlay_refs"),
        contract_refs: list_field(entry, "contractRefs"),
    }
}

/// Parse a task id from a JSON number or a numeric string.
pub fn value_as_task_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn str_field(entry: &Value, key: &str) -> String {
    entry.get(key).map(scalar_text).unwrap_or_default()
}

/// Trimmed, non-empty, order-preserving deduplicated list of strings.
fn list_field(entry: &Value, key: &str) -> Vec<String> {
    let Some(items) = entry.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let s = scalar_text(item).trim().to_string();
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(name: &str, value: Value) -> RawDocument {
        RawDocument {
            name: name.to_string(),
            bytes: serde_json::to_vec(&value).unwrap(),
        }
    }

    fn sample_store() -> JsonTaskStore {
        let master = doc(
            "tasks.json",
            json!({"master": {"tasks": [
                {"id": 3, "title": "Save slots", "description": "Persist saves", "details": "three slots"},
                {"id": "1", "title": "Boot", "description": "Start the game"},
                "not an object",
                {"id": "x", "title": "bad id"},
            ]}}),
        );
        let back = doc(
            "tasks_back.json",
            json!([
                {"taskmaster_id": 3, "acceptance": ["Saves persist. Refs: tests/save.rs", "Saves persist. Refs: tests/save.rs", ""], "labels": ["core"]},
            ]),
        );
        let gameplay = doc(
            "tasks_gameplay.json",
            json!({"tasks": [{"taskmaster_id": "1", "description": "player sees title", "contractRefs": ["C-1"]}]}),
        );
        JsonTaskStore::from_documents(master, Some(back), Some(gameplay))
    }

    #[test]
    fn test_task_ids_sorted_and_filtered() {
        let store = sample_store();
        assert_eq!(store.task_ids().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_resolve_triplet() {
        let store = sample_store();
        let task = store.resolve(3).unwrap();
        assert_eq!(task.title, "Save slots");
        let back = task.back.expect("back view");
        assert_eq!(back.acceptance, vec!["Saves persist. Refs: tests/save.rs"]);
        assert_eq!(back.labels, vec!["core"]);
        assert!(task.gameplay.is_none());

        let boot = store.resolve(1).unwrap();
        assert_eq!(boot.details, "");
        assert_eq!(boot.gameplay.unwrap().contract_refs, vec!["C-1"]);
    }

    #[test]
    fn test_resolve_unknown_id() {
        let store = sample_store();
        assert!(matches!(store.resolve(99), Err(GateError::TaskNotFound(99))));
    }

    #[test]
    fn test_invalid_json_is_store_error() {
        let store = JsonTaskStore::from_documents(
            RawDocument {
                name: "tasks.json".into(),
                bytes: b"{not json".to_vec(),
            },
            None,
            None,
        );
        assert!(matches!(store.task_ids(), Err(GateError::TaskStore(_))));
    }

    #[test]
    fn test_open_reads_documents_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let tasks_dir = dir.path().join(".taskmaster/tasks");
        std::fs::create_dir_all(&tasks_dir).unwrap();
        std::fs::write(
            tasks_dir.join("tasks.json"),
            r#"{"master":{"tasks":[{"id":7,"title":"Seven"}]}}"#,
        )
        .unwrap();

        let store = JsonTaskStore::open(dir.path()).unwrap();
        assert_eq!(store.task_ids().unwrap(), vec![7]);
        assert_eq!(store.raw_documents().len(), 1);
    }

    #[test]
    fn test_open_without_master_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            JsonTaskStore::open(dir.path()),
            Err(GateError::TaskStore(_))
        ));
    }

    #[test]
    fn test_text_fields_cover_views() {
        let task = Task::new(1, "t", "d", "x").with_back(TaskView {
            acceptance: vec!["a".into()],
            ..TaskView::default()
        });
        let paths: Vec<String> = task.text_fields().into_iter().map(|(p, _)| p).collect();
        assert!(paths.contains(&"back.acceptance[0]".to_string()));
        assert!(paths.contains(&"master.details".to_string()));
    }
}
