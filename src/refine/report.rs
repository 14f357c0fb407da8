//! Per-run history, returned to callers and written to `history.json`.

use super::convergence::{SessionPhase, StopReason};
use super::criteria::CriteriaOrigin;
use super::judge::VoteTally;
use crate::config::LogContext;
use crate::errors::IterationFault;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Short SHA-256 digest (first 12 hex chars) of an artifact.
pub fn digest(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    hash.iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// What an iteration did with its challenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationAction {
    /// A stop condition fired; the challenger was discarded.
    Stopped,
    /// The panel preferred the challenger.
    Promoted,
    /// The panel kept the incumbent.
    Retained,
    /// No usable challenger this iteration.
    Skipped,
}

impl fmt::Display for IterationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Promoted => write!(f, "promoted"),
            Self::Retained => write!(f, "retained"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_len: Option<usize>,
    pub stable_count: u32,
    pub action: IterationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<VoteTally>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<IterationFault>,
    pub incumbent_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenger_digest: Option<String>,
}

impl IterationRecord {
    pub fn new(iteration: u32, incumbent: &str) -> Self {
        Self {
            iteration,
            recommendation: None,
            gap_len: None,
            stable_count: 0,
            action: IterationAction::Skipped,
            stop_reason: None,
            votes: None,
            faults: Vec::new(),
            incumbent_digest: digest(incumbent),
            challenger_digest: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub phase: SessionPhase,
    #[serde(default)]
    pub log_context: LogContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria_origin: Option<CriteriaOrigin>,
    #[serde(default)]
    pub iterations: Vec<IterationRecord>,
    /// Faults outside any iteration (initial generation, criteria, persistence).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<IterationFault>,
    pub critique_calls: u32,
    pub judge_panels: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_digest: Option<String>,
}

impl RefinementReport {
    pub fn new(run_id: Uuid, log_context: &LogContext) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            phase: SessionPhase::GeneratingInitial,
            log_context: log_context.clone(),
            criteria: None,
            criteria_origin: None,
            iterations: Vec::new(),
            faults: Vec::new(),
            critique_calls: 0,
            judge_panels: 0,
            final_digest: None,
        }
    }

    pub fn count(&self, action: IterationAction) -> usize {
        self.iterations.iter().filter(|r| r.action == action).count()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.iterations.iter().rev().find_map(|r| r.stop_reason)
    }

    pub fn finish(&mut self, phase: SessionPhase, artifact: Option<&str>) {
        self.phase = phase;
        self.finished_at = Some(Utc::now());
        self.final_digest = artifact.map(digest);
    }

    /// One-line summary for logs and `temper status`.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} iterations ({} promoted, {} retained, {} skipped), {} critiques, {} judge panels",
            self.iterations.len(),
            self.count(IterationAction::Promoted),
            self.count(IterationAction::Retained),
            self.count(IterationAction::Skipped),
            self.critique_calls,
            self.judge_panels,
        );
        if let Some(reason) = self.stop_reason() {
            line.push_str(&format!(", stopped: {}", reason));
        }
        line
    }
}
