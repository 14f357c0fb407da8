//! Critique generation: improvement advice plus a quality ordinal.

use crate::errors::{IterationFault, OracleError, Stage};
use crate::oracle::{Oracle, OracleRequest};
use crate::signals::{extract_first_integer, extract_section};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Heading that opens every critique prompt.
pub const CRITIQUE_HEADING: &str = "# Critique Request";

/// How much room for improvement the critic sees, 1 (major work needed)
/// through 4 (no improvement possible).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recommendation(u8);

impl Recommendation {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    /// Clamp any integer into 1..=4.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// The critic asks for another round regardless of other signals.
    pub fn demands_iteration(&self) -> bool {
        self.0 == Self::MIN
    }
}

impl Default for Recommendation {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CritiqueResult {
    pub advice: String,
    pub recommendation: Recommendation,
    /// False when the recommendation was defaulted.
    pub recommendation_parsed: bool,
}

impl CritiqueResult {
    /// Parse raw critique output.
    pub fn parse(raw: &str) -> Self {
        let advice = match extract_section(raw, "advice") {
            a if a.is_empty() => raw.trim().to_string(),
            a => a,
        };

        let parsed = extract_first_integer(&extract_section(raw, "recommendation"));
        Self {
            advice,
            recommendation: parsed.map(Recommendation::clamped).unwrap_or_default(),
            recommendation_parsed: parsed.is_some(),
        }
    }

    /// Fault to record when the recommendation had to be defaulted.
    pub fn parse_fault(&self) -> Option<IterationFault> {
        (!self.recommendation_parsed).then(|| {
            IterationFault::parse("recommendation", &Recommendation::default().to_string())
        })
    }
}

pub fn build_critique_prompt(task_prompt: &str, incumbent: &str, criteria: &str) -> String {
    format!(
        r#"{heading}

You are reviewing a draft produced for the task below. Judge it against the
evaluation criteria and give concrete, actionable advice for the next revision.

## Task

{task_prompt}

## Evaluation Criteria

{criteria}

## Current Version

{incumbent}

## Output Format

Put your advice inside <advice></advice> tags.

Then rate how much the draft can still improve, as a single number inside
<recommendation></recommendation> tags:
1 - needs major work
2 - needs moderate work
3 - minor polish only
4 - no improvement possible
"#,
        heading = CRITIQUE_HEADING,
        task_prompt = task_prompt,
        criteria = criteria,
        incumbent = incumbent,
    )
}

/// Ask the oracle to critique the incumbent.
///
/// Returns `Err` with an [`IterationFault`] when the oracle call fails; the
/// caller skips the iteration.
pub async fn critique(
    oracle: &dyn Oracle,
    model: Option<&str>,
    task_prompt: &str,
    incumbent: &str,
    criteria: &str,
) -> Result<CritiqueResult, IterationFault> {
    let request = OracleRequest::new(build_critique_prompt(task_prompt, incumbent, criteria))
        .with_model(model);
    let raw = oracle
        .generate(&request)
        .await
        .map_err(|e: OracleError| IterationFault::oracle(Stage::Critique, &e))?;

    let result = CritiqueResult::parse(&raw);
    if !result.recommendation_parsed {
        tracing::warn!("critique recommendation missing or unparsable; defaulting to 1");
    }
    Ok(result)
}
