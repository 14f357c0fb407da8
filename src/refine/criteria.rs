//! Evaluation rubric resolution.

use crate::config::CriteriaSource;
use crate::errors::{IterationFault, Stage};
use crate::oracle::{Oracle, OracleRequest, StyleHint};
use crate::signals::extract_section;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Heading that opens every rubric synthesis prompt.
pub const CRITERIA_HEADING: &str = "# Evaluation Criteria Request";

/// Rubric used when nothing else produced one.
pub const DEFAULT_CRITERIA: &str = "completeness, accuracy, adherence to prompt";

/// Where the resolved rubric came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaOrigin {
    Explicit,
    File,
    Synthesized,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCriteria {
    /// Never empty.
    pub text: String,
    pub origin: CriteriaOrigin,
    pub faults: Vec<IterationFault>,
}

impl ResolvedCriteria {
    fn new(text: String, origin: CriteriaOrigin, faults: Vec<IterationFault>) -> Self {
        Self {
            text,
            origin,
            faults,
        }
    }
}

pub fn build_criteria_prompt(task_prompt: &str) -> String {
    format!(
        r#"{heading}

Write a concise rubric for judging responses to the task below. Name the
qualities a strong response must have and what would make one response better
than another. Do not perform the task.

## Task

{task_prompt}

## Output Format

Respond with the rubric inside <criteria></criteria> tags.
"#,
        heading = CRITERIA_HEADING,
        task_prompt = task_prompt,
    )
}

/// Resolves the rubric: explicit text, then file, then oracle, then
/// [`DEFAULT_CRITERIA`].
pub struct CriteriaResolver {
    oracle: Arc<dyn Oracle>,
    model: Option<String>,
}

impl CriteriaResolver {
    pub fn new(oracle: Arc<dyn Oracle>, model: Option<String>) -> Self {
        Self { oracle, model }
    }

    pub async fn resolve(&self, source: &CriteriaSource, task_prompt: &str) -> ResolvedCriteria {
        let mut faults = Vec::new();

        match source {
            CriteriaSource::Text(text) if !text.trim().is_empty() => {
                return ResolvedCriteria::new(
                    text.trim().to_string(),
                    CriteriaOrigin::Explicit,
                    faults,
                );
            }
            CriteriaSource::File(path) if path.exists() => match std::fs::read_to_string(path) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::debug!(path = %path.display(), "criteria loaded from file");
                    return ResolvedCriteria::new(
                        text.trim().to_string(),
                        CriteriaOrigin::File,
                        faults,
                    );
                }
                Ok(_) => tracing::warn!(path = %path.display(), "criteria file is blank"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read criteria file")
                }
            },
            CriteriaSource::File(path) => {
                tracing::debug!(path = %path.display(), "criteria file not found")
            }
            _ => {}
        }

        let request = OracleRequest::new(build_criteria_prompt(task_prompt))
            .with_style(StyleHint::Precise)
            .with_model(self.model.as_deref());
        match self.oracle.generate(&request).await {
            Ok(raw) => {
                let section = extract_section(&raw, "criteria");
                let text = if section.is_empty() {
                    raw.trim().to_string()
                } else {
                    section
                };
                if !text.is_empty() {
                    return ResolvedCriteria::new(text, CriteriaOrigin::Synthesized, faults);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "criteria synthesis failed; using default rubric");
                faults.push(IterationFault::oracle(Stage::Criteria, &e));
            }
        }

        ResolvedCriteria::new(DEFAULT_CRITERIA.to_string(), CriteriaOrigin::Fallback, faults)
    }
}
