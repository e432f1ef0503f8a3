//! Test doubles for the generator and validator collaborators.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::llm::DraftGenerator;
use crate::schema::{Conversation, DraftGraph};
use crate::validate::SchemaValidator;

enum Scripted {
    Draft(DraftGraph),
    Failure(String),
}

/// Generator replaying a fixed script of drafts, recording every context it
/// was called with. Running past the end of the script is an error.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Scripted>>,
    contexts: Mutex<Vec<Conversation>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_draft(self, draft: DraftGraph) -> Self {
        self.script.lock().unwrap().push_back(Scripted::Draft(draft));
        self
    }

    pub fn then_content(self, content: &str) -> Self {
        self.then_draft(DraftGraph::new(content, Vec::new()))
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Failure(message.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    /// Context passed to each call, in call order.
    pub fn contexts(&self) -> Vec<Conversation> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DraftGenerator for ScriptedGenerator {
    async fn generate(&self, context: &Conversation) -> Result<DraftGraph> {
        self.contexts.lock().unwrap().push(context.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Draft(draft)) => Ok(draft),
            Some(Scripted::Failure(message)) => Err(anyhow::anyhow!(message)),
            None => anyhow::bail!("generator script exhausted"),
        }
    }
}

/// Validator that rejects configured contents with a fixed report and
/// accepts everything else.
#[derive(Default)]
pub struct ScriptedValidator {
    reports: HashMap<String, String>,
    seen: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, content: &str, report: &str) -> Self {
        self.reports.insert(content.to_string(), report.to_string());
        self
    }

    /// Every `(graph, shapes)` pair validated so far.
    pub fn seen(&self) -> Vec<(String, Option<String>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaValidator for ScriptedValidator {
    async fn validate(&self, graph: &str, shapes: Option<&str>) -> Result<Option<String>> {
        self.seen
            .lock()
            .unwrap()
            .push((graph.to_string(), shapes.map(str::to_string)));
        Ok(self.reports.get(graph).cloned())
    }
}
