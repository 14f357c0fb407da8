//! Judge panel: N independent comparisons of incumbent and challenger.

use super::gap::GapReport;
use crate::errors::{IterationFault, Stage};
use crate::oracle::{Oracle, OracleRequest, StyleHint};
use crate::signals::extract_section;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Heading that opens every judge prompt.
pub const JUDGE_HEADING: &str = "# Judge Comparison";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Version 1.
    Incumbent,
    /// Version 2.
    Challenger,
}

/// Winner of a tied panel, and the vote counted for a failed or unparsable
/// judge.
pub const TIE_BREAK_WINNER: Verdict = Verdict::Incumbent;

/// Parse a judge reply. Only a `<verdict>` section starting with 1 or 2, or a
/// bare `1`/`2` reply, counts.
pub fn parse_verdict(raw: &str) -> Option<Verdict> {
    let section = extract_section(raw, "verdict");
    let answer = if section.is_empty() {
        match raw.trim() {
            bare @ ("1" | "2") => bare,
            _ => return None,
        }
    } else {
        section.as_str()
    };

    match answer.chars().next() {
        Some('1') => Some(Verdict::Incumbent),
        Some('2') => Some(Verdict::Challenger),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub incumbent: u32,
    pub challenger: u32,
    /// Votes counted for the incumbent because the judge failed or was unclear.
    pub defaulted: u32,
}

impl VoteTally {
    pub fn record(&mut self, vote: Option<Verdict>) {
        match vote.unwrap_or(TIE_BREAK_WINNER) {
            Verdict::Incumbent => self.incumbent += 1,
            Verdict::Challenger => self.challenger += 1,
        }
        if vote.is_none() {
            self.defaulted += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.incumbent + self.challenger
    }

    /// The challenger needs a strict majority.
    pub fn winner(&self) -> Verdict {
        if self.challenger > self.incumbent {
            Verdict::Challenger
        } else if self.incumbent > self.challenger {
            Verdict::Incumbent
        } else {
            TIE_BREAK_WINNER
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelOutcome {
    pub winner: Verdict,
    pub tally: VoteTally,
    pub faults: Vec<IterationFault>,
}

/// Inputs shared by every judge on one panel.
#[derive(Debug, Clone, Copy)]
pub struct Comparison<'a> {
    pub task_prompt: &'a str,
    pub criteria: &'a str,
    pub incumbent: &'a str,
    pub challenger: &'a str,
    pub gap: Option<&'a GapReport>,
}

pub fn build_judge_prompt(comparison: &Comparison<'_>) -> String {
    let gap_section = match comparison.gap {
        Some(report) if !report.is_empty() => format!(
            r#"
## Detected Information Loss

The following details from Version 1 are missing or weakened in Version 2.
Penalize Version 2 for each of them unless it clearly compensates.

{}
"#,
            report.text
        ),
        _ => String::new(),
    };

    format!(
        r#"{heading}

Two versions of a response to the same task are shown below. Decide which one
better satisfies the evaluation criteria. The task is context only; do not
carry it out yourself.

## Task

{task_prompt}

## Evaluation Criteria

{criteria}
{gap_section}
## Version 1

{incumbent}

## Version 2

{challenger}

## Output Format

Answer with exactly one value, 1 or 2, inside <verdict></verdict> tags.
"#,
        heading = JUDGE_HEADING,
        task_prompt = comparison.task_prompt,
        criteria = comparison.criteria,
        gap_section = gap_section,
        incumbent = comparison.incumbent,
        challenger = comparison.challenger,
    )
}

/// Dispatches judges concurrently and tallies their votes.
pub struct JudgePanel {
    oracle: Arc<dyn Oracle>,
    judges: usize,
    model: Option<String>,
}

impl JudgePanel {
    pub fn new(oracle: Arc<dyn Oracle>, judges: usize, model: Option<String>) -> Self {
        Self {
            oracle,
            judges: judges.max(1),
            model,
        }
    }

    async fn run_single_judge(
        &self,
        index: usize,
        prompt: &str,
    ) -> (Option<Verdict>, Option<IterationFault>) {
        let style = StyleHint::for_judge(index, self.judges);
        let request = OracleRequest::new(prompt)
            .with_style(style)
            .with_model(self.model.as_deref());

        match self.oracle.generate(&request).await {
            Ok(raw) => match parse_verdict(&raw) {
                Some(verdict) => {
                    tracing::debug!(judge = index, %style, ?verdict, "judge voted");
                    (Some(verdict), None)
                }
                None => {
                    tracing::warn!(judge = index, %style, "unparsable verdict; counting for incumbent");
                    (None, Some(IterationFault::parse("judge verdict", "1")))
                }
            },
            Err(e) => {
                tracing::warn!(judge = index, %style, error = %e, "judge failed; counting for incumbent");
                (None, Some(IterationFault::oracle(Stage::Judge, &e)))
            }
        }
    }

    pub async fn judge(&self, comparison: &Comparison<'_>) -> PanelOutcome {
        use futures::future::join_all;

        let prompt = build_judge_prompt(comparison);
        let futures: Vec<_> = (0..self.judges)
            .map(|index| self.run_single_judge(index, &prompt))
            .collect();
        let results = join_all(futures).await;

        let mut tally = VoteTally::default();
        let mut faults = Vec::new();
        for (vote, fault) in results {
            tally.record(vote);
            faults.extend(fault);
        }

        let winner = tally.winner();
        tracing::info!(
            incumbent = tally.incumbent,
            challenger = tally.challenger,
            defaulted = tally.defaulted,
            ?winner,
            "judge panel decided"
        );
        PanelOutcome {
            winner,
            tally,
            faults,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OracleError;
    use crate::testing::ScriptedOracle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn comparison<'a>(gap: Option<&'a GapReport>) -> Comparison<'a> {
        Comparison {
            task_prompt: "Summarize the memo",
            criteria: "keep every number",
            incumbent: "memo v1",
            challenger: "memo v2",
            gap,
        }
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict("<verdict>2</verdict>"), Some(Verdict::Challenger));
        assert_eq!(parse_verdict("<verdict> 1 </verdict>"), Some(Verdict::Incumbent));
        assert_eq!(parse_verdict("  2\n"), Some(Verdict::Challenger));
        assert_eq!(parse_verdict("Version 2 is better"), None);
        assert_eq!(parse_verdict("<verdict>both</verdict>"), None);
        assert_eq!(parse_verdict(""), None);
    }

    #[test]
    fn test_tally_tie_keeps_incumbent() {
        let mut tally = VoteTally::default();
        tally.record(Some(Verdict::Challenger));
        tally.record(Some(Verdict::Incumbent));
        assert_eq!(tally.winner(), Verdict::Incumbent);
        assert_eq!(TIE_BREAK_WINNER, Verdict::Incumbent);
    }

    #[test]
    fn test_tally_defaults_count_for_incumbent() {
        let mut tally = VoteTally::default();
        tally.record(Some(Verdict::Challenger));
        tally.record(None);
        tally.record(None);
        assert_eq!(tally.incumbent, 2);
        assert_eq!(tally.defaulted, 2);
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.winner(), Verdict::Incumbent);
    }

    #[test]
    fn test_prompt_includes_gap_report() {
        let gap = GapReport {
            text: "- cherry".to_string(),
            items: vec!["cherry".to_string()],
        };
        let prompt = build_judge_prompt(&comparison(Some(&gap)));
        assert!(prompt.starts_with(JUDGE_HEADING));
        assert!(prompt.contains("Detected Information Loss"));
        assert!(prompt.contains("- cherry"));
        assert!(prompt.contains("## Version 1\n\nmemo v1"));
        assert!(prompt.contains("## Version 2\n\nmemo v2"));

        let without = build_judge_prompt(&comparison(Some(&GapReport::default())));
        assert!(!without.contains("Detected Information Loss"));
    }

    #[tokio::test]
    async fn test_even_panel_split_keeps_incumbent() {
        let n = AtomicUsize::new(0);
        let oracle = Arc::new(ScriptedOracle::new(move |_| {
            let i = n.fetch_add(1, Ordering::SeqCst);
            Ok(format!("<verdict>{}</verdict>", if i % 2 == 0 { 2 } else { 1 }))
        }));
        let panel = JudgePanel::new(oracle.clone(), 2, None);
        let outcome = panel.judge(&comparison(None)).await;
        assert_eq!(outcome.tally.challenger, 1);
        assert_eq!(outcome.tally.incumbent, 1);
        assert_eq!(outcome.winner, Verdict::Incumbent);
        assert_eq!(oracle.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_majority_promotes_challenger() {
        let oracle = Arc::new(ScriptedOracle::new(|req: &OracleRequest| {
            if req.style == Some(StyleHint::Skeptical) {
                Ok("<verdict>1</verdict>".to_string())
            } else {
                Ok("<verdict>2</verdict>".to_string())
            }
        }));
        let panel = JudgePanel::new(oracle.clone(), 3, Some("opus".to_string()));
        let outcome = panel.judge(&comparison(None)).await;
        assert_eq!(outcome.winner, Verdict::Challenger);
        assert_eq!(outcome.tally.challenger, 2);
        assert!(outcome.faults.is_empty());

        let styles: Vec<_> = oracle.calls().iter().map(|r| r.style).collect();
        assert_eq!(
            styles,
            vec![
                Some(StyleHint::Precise),
                Some(StyleHint::Skeptical),
                Some(StyleHint::Balanced)
            ]
        );
        assert!(oracle.calls().iter().all(|r| r.model.as_deref() == Some("opus")));
    }

    #[tokio::test]
    async fn test_lone_judge_uses_precise() {
        let oracle = Arc::new(ScriptedOracle::new(|_| Ok("<verdict>2</verdict>".to_string())));
        let panel = JudgePanel::new(oracle.clone(), 1, None);
        let outcome = panel.judge(&comparison(None)).await;
        assert_eq!(outcome.winner, Verdict::Challenger);
        assert_eq!(oracle.calls()[0].style, Some(StyleHint::Precise));
    }

    #[tokio::test]
    async fn test_failed_judges_default_to_incumbent() {
        let oracle = Arc::new(ScriptedOracle::new(|req: &OracleRequest| {
            match req.style {
                Some(StyleHint::Precise) => Ok("<verdict>2</verdict>".to_string()),
                Some(StyleHint::Skeptical) => Err(OracleError::EmptyResponse),
                _ => Ok("no idea".to_string()),
            }
        }));
        let panel = JudgePanel::new(oracle, 3, None);
        let outcome = panel.judge(&comparison(None)).await;
        assert_eq!(outcome.winner, Verdict::Incumbent);
        assert_eq!(outcome.tally.defaulted, 2);
        assert_eq!(outcome.faults.len(), 2);
    }
}
