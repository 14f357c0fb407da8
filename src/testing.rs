//! Test doubles shared by the unit tests.

use crate::errors::OracleError;
use crate::oracle::{Oracle, OracleRequest};
use async_trait::async_trait;
use std::sync::Mutex;

/// Which step of the loop a prompt belongs to, recognized by its heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromptKind {
    Generation,
    Criteria,
    Critique,
    Candidate,
    Checklist,
    Gap,
    Judge,
}

pub(crate) fn classify(prompt: &str) -> PromptKind {
    use crate::oracle::CHECKLIST_HEADING;
    use crate::refine::{
        CANDIDATE_CONTEXT_HEADING, CRITERIA_HEADING, CRITIQUE_HEADING, GAP_HEADING, JUDGE_HEADING,
    };

    if prompt.starts_with(CRITERIA_HEADING) {
        PromptKind::Criteria
    } else if prompt.starts_with(CRITIQUE_HEADING) {
        PromptKind::Critique
    } else if prompt.starts_with(CHECKLIST_HEADING) {
        PromptKind::Checklist
    } else if prompt.starts_with(GAP_HEADING) {
        PromptKind::Gap
    } else if prompt.starts_with(JUDGE_HEADING) {
        PromptKind::Judge
    } else if prompt.contains(CANDIDATE_CONTEXT_HEADING) {
        PromptKind::Candidate
    } else {
        PromptKind::Generation
    }
}

/// Oracle answering from a closure and recording every request.
pub(crate) struct ScriptedOracle<F> {
    respond: F,
    calls: Mutex<Vec<OracleRequest>>,
}

impl<F> ScriptedOracle<F>
where
    F: Fn(&OracleRequest) -> Result<String, OracleError> + Send + Sync,
{
    pub(crate) fn new(respond: F) -> Self {
        Self {
            respond,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<OracleRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, kind: PromptKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| classify(&r.prompt) == kind)
            .count()
    }
}

#[async_trait]
impl<F> Oracle for ScriptedOracle<F>
where
    F: Fn(&OracleRequest) -> Result<String, OracleError> + Send + Sync,
{
    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.calls.lock().unwrap().push(request.clone());
        (self.respond)(request)
    }
}
