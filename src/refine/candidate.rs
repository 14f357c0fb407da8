//! Candidate generation from the incumbent and critique advice.

use crate::errors::{IterationFault, OracleError, Stage};
use crate::oracle::{Oracle, OracleRequest};
use regex::{Captures, Regex};
use std::sync::LazyLock;

pub const PREVIOUS_VERSION_PLACEHOLDER: &str = "{{PREVIOUS_VERSION}}";
pub const ADVICE_PLACEHOLDER: &str = "{{ADVICE}}";

/// Heading of the block appended to prompts without placeholders.
pub const CANDIDATE_CONTEXT_HEADING: &str = "## Context for Improvement";

/// Text substituted for both placeholders on the initial generation.
pub const INITIAL_PLACEHOLDER_TEXT: &str = "(none)";

/// Whether the prompt carries both substitution placeholders.
pub fn has_placeholders(task_prompt: &str) -> bool {
    task_prompt.contains(PREVIOUS_VERSION_PLACEHOLDER) && task_prompt.contains(ADVICE_PLACEHOLDER)
}

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(?:PREVIOUS_VERSION|ADVICE)\}\}").unwrap());

// Single pass over the template: placeholder text inside the substituted
// values is left alone.
fn substitute(task_prompt: &str, previous: &str, advice: &str) -> String {
    PLACEHOLDER_REGEX
        .replace_all(task_prompt, |caps: &Captures| {
            if &caps[0] == PREVIOUS_VERSION_PLACEHOLDER {
                previous.to_string()
            } else {
                advice.to_string()
            }
        })
        .into_owned()
}

/// Prompt for the very first generation.
pub fn build_initial_prompt(task_prompt: &str) -> String {
    if has_placeholders(task_prompt) {
        substitute(task_prompt, INITIAL_PLACEHOLDER_TEXT, INITIAL_PLACEHOLDER_TEXT)
    } else {
        task_prompt.to_string()
    }
}

pub fn build_candidate_prompt(task_prompt: &str, incumbent: &str, advice: &str) -> String {
    if has_placeholders(task_prompt) {
        return substitute(task_prompt, incumbent, advice);
    }

    format!(
        r#"{task_prompt}

{heading}

A previous version of the response is shown below together with reviewer
advice. Produce a complete new version that incorporates the advice.

Keep every fact, detail, value and requirement the previous version already
covers. Do not drop, merge away or summarize existing detail. Respond with the
new version only.

### Previous Version

{incumbent}

### Advice

{advice}
"#,
        task_prompt = task_prompt,
        heading = CANDIDATE_CONTEXT_HEADING,
        incumbent = incumbent,
        advice = advice,
    )
}

/// Generate a challenger.
///
/// The reply is kept byte-for-byte. Blank output and oracle failures both
/// come back as a candidate-stage [`IterationFault`]; the caller skips the
/// iteration.
pub async fn generate_candidate(
    oracle: &dyn Oracle,
    model: Option<&str>,
    task_prompt: &str,
    incumbent: &str,
    advice: &str,
) -> Result<String, IterationFault> {
    let request = OracleRequest::new(build_candidate_prompt(task_prompt, incumbent, advice))
        .with_model(model);
    let raw = oracle
        .generate(&request)
        .await
        .map_err(|e| IterationFault::oracle(Stage::Candidate, &e))?;

    if raw.trim().is_empty() {
        return Err(IterationFault::oracle(
            Stage::Candidate,
            &OracleError::EmptyResponse,
        ));
    }
    Ok(raw)
}
