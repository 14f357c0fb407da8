//! Oracle abstraction: the black-box text generator every refinement step calls.
//!
//! The core only sees the [`Oracle`] and [`ChecklistExtractor`] traits. The
//! default implementations shell out to the Claude CLI ([`ClaudeCliOracle`])
//! and ask the same oracle for itemized lists ([`OracleChecklistExtractor`]).

mod checklist;
mod claude;

pub use checklist::{
    CHECKLIST_HEADING, ChecklistExtractor, OracleChecklistExtractor, build_checklist_prompt,
};
pub use claude::{ClaudeCliOracle, ClaudeCliOracleConfig};

use crate::errors::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation style passed alongside a prompt.
///
/// Judges on a multi-member panel rotate through these so their votes are
/// less correlated. A lone judge always uses [`StyleHint::Precise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleHint {
    /// Literal, exact, low-variance.
    Precise,
    /// Even-handed default reading.
    Balanced,
    /// Looser, more exploratory reading.
    Creative,
    /// Adversarial reading that hunts for regressions.
    Skeptical,
}

impl StyleHint {
    /// Persona order used when dispatching a panel of judges.
    pub const JUDGE_ROTATION: [StyleHint; 4] = [
        StyleHint::Precise,
        StyleHint::Skeptical,
        StyleHint::Balanced,
        StyleHint::Creative,
    ];

    /// Style for judge `index` on a panel of `panel_size`.
    pub fn for_judge(index: usize, panel_size: usize) -> Self {
        if panel_size <= 1 {
            return StyleHint::Precise;
        }
        Self::JUDGE_ROTATION[index % Self::JUDGE_ROTATION.len()]
    }

    /// Instruction prepended to the prompt by transports without a native
    /// style parameter.
    pub fn preamble(&self) -> &'static str {
        match self {
            Self::Precise => {
                "Respond precisely and literally. Prefer exactness over flourish and do not speculate."
            }
            Self::Balanced => "Respond in a balanced, even-handed way, weighing all factors fairly.",
            Self::Creative => {
                "Respond with an open, exploratory mindset, valuing insight and fresh angles."
            }
            Self::Skeptical => {
                "Respond as a skeptical reviewer. Look hard for omissions, regressions and unsupported claims."
            }
        }
    }
}

impl fmt::Display for StyleHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precise => write!(f, "precise"),
            Self::Balanced => write!(f, "balanced"),
            Self::Creative => write!(f, "creative"),
            Self::Skeptical => write!(f, "skeptical"),
        }
    }
}

/// A single oracle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub prompt: String,
    pub style: Option<StyleHint>,
    pub model: Option<String>,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: None,
            model: None,
        }
    }

    pub fn with_style(mut self, style: StyleHint) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_model(mut self, model: Option<&str>) -> Self {
        self.model = model.map(str::to_string);
        self
    }
}

/// Text generation capability.
///
/// Implementations return `Err` for transport failures and for blank output;
/// callers treat both the same way.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError>;
}
