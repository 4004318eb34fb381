//! Scripted judge for tests (no subprocess).

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::judge::{Judge, JudgeOutcome};

/// One canned judge reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    pub rc: i32,
    /// Written to the answer path when set; `None` leaves no answer file.
    pub answer: Option<String>,
    pub trace: String,
}

impl ScriptedReply {
    /// A successful run answering `answer`.
    pub fn answer(answer: impl Into<String>) -> Self {
        Self {
            rc: 0,
            answer: Some(answer.into()),
            trace: String::new(),
        }
    }

    /// A run that exits with `rc` and leaves no answer.
    pub fn silent(rc: i32) -> Self {
        Self {
            rc,
            answer: None,
            trace: format!("scripted judge exited with {rc}"),
        }
    }
}

/// Judge that replays [`ScriptedReply`]s in call order and records every
/// prompt it receives. Once the script is exhausted every call is silent
/// with rc 0.
#[derive(Debug, Default)]
pub struct ScriptedJudge {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedJudge {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::default(),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn invoke(&self, prompt: &str, answer_path: &Path, _timeout: Duration) -> JudgeOutcome {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::silent(0));

        if let Some(answer) = &reply.answer {
            if let Err(e) = tokio::fs::write(answer_path, answer).await {
                return JudgeOutcome::new(1, format!("scripted judge write failed: {e}"));
            }
        }
        JudgeOutcome::new(reply.rc, reply.trace)
    }
}
