//! Completeness gap analysis between two versions of an artifact.
//!
//! Both versions are reduced to checklists first. When every incumbent item
//! reappears verbatim (modulo case and spacing) in the challenger there is
//! nothing to report and no further oracle call is made. Otherwise the oracle
//! is asked which incumbent items are missing or weakened.

use super::report::digest;
use crate::errors::IterationFault;
use crate::oracle::{ChecklistExtractor, Oracle, OracleRequest, StyleHint};
use crate::signals::{extract_list_items, extract_section, is_none_marker};
use std::collections::HashSet;
use std::sync::Arc;

/// Heading that opens every gap analysis prompt.
pub const GAP_HEADING: &str = "# Gap Analysis";

const CHECKLIST_INSTRUCTIONS: &str = "Extract an exhaustive list of every distinct fact, \
requirement and detail stated in the text below.";

/// Incumbent items missing or weakened in the challenger. Empty means no
/// regression was detected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapReport {
    pub text: String,
    pub items: Vec<String>,
}

impl GapReport {
    fn from_text(text: String) -> Self {
        let items = extract_list_items(&text);
        Self { text, items }
    }

    /// Length in characters, the quantity the convergence controller tracks.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

fn normalize(item: &str) -> String {
    item.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Incumbent items with no exact (normalized) match in the challenger.
pub fn unmatched_items<'a>(incumbent: &'a [String], challenger: &[String]) -> Vec<&'a str> {
    let present: HashSet<String> = challenger.iter().map(|i| normalize(i)).collect();
    incumbent
        .iter()
        .filter(|item| !present.contains(&normalize(item)))
        .map(String::as_str)
        .collect()
}

fn bullets<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|i| format!("- {}", i.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_gap_prompt(incumbent: &[String], challenger: &[String]) -> String {
    let unmatched = unmatched_items(incumbent, challenger);

    format!(
        r#"{heading}

Checklist A was extracted from the current best version of a document.
Checklist B was extracted from a proposed replacement.

Report every item of Checklist A that is absent from Checklist B or that B
only summarizes, generalizes or weakens. Loss of fine-grained detail (specific
values, names, qualifiers, edge cases) matters more than missing top-level
topics. Items that B merely rewords without losing detail are not gaps.

## Checklist A (current version)

{incumbent}

## Checklist B (proposed version)

{challenger}

## Items of A Without an Exact Match in B

{unmatched}

## Output Format

List the gaps inside <gaps></gaps> tags, one per line starting with "- ".
If there are no gaps, respond with <gaps>NONE</gaps>.
"#,
        heading = GAP_HEADING,
        incumbent = bullets(incumbent),
        challenger = bullets(challenger),
        unmatched = bullets(&unmatched),
    )
}

/// Parse the oracle's gap reply. A `NONE` marker or an empty section yields
/// an empty report.
pub fn parse_gap_reply(raw: &str) -> GapReport {
    let section = extract_section(raw, "gaps");
    let body = if section.is_empty() && !raw.contains("<gaps>") {
        raw.trim().to_string()
    } else {
        section
    };

    if is_none_marker(&body) {
        GapReport::default()
    } else {
        GapReport::from_text(body)
    }
}

/// Runs gap analysis for one session.
///
/// The incumbent's checklist is cached by content digest, so a retained
/// incumbent is only listed once.
pub struct GapAnalyzer {
    oracle: Arc<dyn Oracle>,
    checklists: Arc<dyn ChecklistExtractor>,
    model: Option<String>,
    cached: Option<(String, Vec<String>)>,
}

impl GapAnalyzer {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        checklists: Arc<dyn ChecklistExtractor>,
        model: Option<String>,
    ) -> Self {
        Self {
            oracle,
            checklists,
            model,
            cached: None,
        }
    }

    async fn checklist(&self, text: &str, role: &str) -> Result<Vec<String>, IterationFault> {
        let items = self
            .checklists
            .extract_checklist(text, CHECKLIST_INSTRUCTIONS)
            .await
            .map_err(|e| IterationFault::gap(format!("{} checklist failed: {}", role, e)))?;
        if items.is_empty() {
            return Err(IterationFault::gap(format!("{} checklist is empty", role)));
        }
        Ok(items)
    }

    async fn incumbent_checklist(&mut self, incumbent: &str) -> Result<Vec<String>, IterationFault> {
        let key = digest(incumbent);
        if let Some((cached_key, items)) = &self.cached
            && *cached_key == key
        {
            return Ok(items.clone());
        }
        let items = self.checklist(incumbent, "incumbent").await?;
        self.cached = Some((key, items.clone()));
        Ok(items)
    }

    /// Compare two versions. An `Err` means gap analysis did not run.
    pub async fn analyze(
        &mut self,
        incumbent: &str,
        challenger: &str,
    ) -> Result<GapReport, IterationFault> {
        let incumbent_items = self.incumbent_checklist(incumbent).await?;
        let challenger_items = self.checklist(challenger, "challenger").await?;

        if unmatched_items(&incumbent_items, &challenger_items).is_empty() {
            tracing::debug!(
                items = incumbent_items.len(),
                "challenger checklist covers incumbent"
            );
            return Ok(GapReport::default());
        }

        let request = OracleRequest::new(build_gap_prompt(&incumbent_items, &challenger_items))
            .with_style(StyleHint::Precise)
            .with_model(self.model.as_deref());
        let raw = self
            .oracle
            .generate(&request)
            .await
            .map_err(|e| IterationFault::gap(format!("gap oracle call failed: {}", e)))?;

        let report = parse_gap_reply(&raw);
        tracing::debug!(gaps = report.items.len(), chars = report.len(), "gap analysis done");
        Ok(report)
    }
}
