//! Exhaustive checklist extraction used by gap analysis.

use super::{Oracle, OracleRequest, StyleHint};
use crate::errors::OracleError;
use crate::signals::{extract_list_items, extract_section};
use async_trait::async_trait;
use std::sync::Arc;

/// Heading that opens every checklist prompt.
pub const CHECKLIST_HEADING: &str = "# Checklist Extraction";

/// Itemized listing of the distinct facts and requirements in a text.
#[async_trait]
pub trait ChecklistExtractor: Send + Sync {
    async fn extract_checklist(
        &self,
        source: &str,
        instructions: &str,
    ) -> Result<Vec<String>, OracleError>;
}

/// Build the prompt asking for an exhaustive list.
pub fn build_checklist_prompt(source: &str, instructions: &str) -> String {
    format!(
        r#"{heading}

{instructions}

List every distinct item separately. Keep specific values, names, numbers,
edge cases and qualifiers attached to the item they belong to. Do not merge
or summarize items. Do not add items that are not in the text.

## Text

{source}

## Output Format

Respond with the list inside <list></list> tags, one item per line, each line
starting with "- ".
"#,
        heading = CHECKLIST_HEADING,
        instructions = instructions,
        source = source,
    )
}

/// Asks the oracle for the list and parses its bullets.
pub struct OracleChecklistExtractor {
    oracle: Arc<dyn Oracle>,
    model: Option<String>,
}

impl OracleChecklistExtractor {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

#[async_trait]
impl ChecklistExtractor for OracleChecklistExtractor {
    async fn extract_checklist(
        &self,
        source: &str,
        instructions: &str,
    ) -> Result<Vec<String>, OracleError> {
        let request = OracleRequest::new(build_checklist_prompt(source, instructions))
            .with_style(StyleHint::Precise)
            .with_model(self.model.as_deref());
        let output = self.oracle.generate(&request).await?;

        let section = extract_section(&output, "list");
        let body = if section.is_empty() { output.as_str() } else { section.as_str() };
        Ok(extract_list_items(body))
    }
}
