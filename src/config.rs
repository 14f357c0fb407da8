use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::temper_config::TemperConfig;

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;
pub const DEFAULT_JUDGES: u32 = 1;
pub const DEFAULT_GAP_SIZE_THRESHOLD: usize = 10_000;
pub const DEFAULT_STABILITY_WINDOW: u32 = 2;
pub const DEFAULT_MIN_IMPROVEMENT: f64 = 0.05;

/// Where the evaluation rubric comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CriteriaSource {
    /// Rubric given inline.
    Text(String),
    /// Rubric read from a file, if it exists.
    File(PathBuf),
    /// Ask the oracle to write one.
    #[default]
    None,
}

/// When gap analysis runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapMode {
    /// Every iteration.
    On,
    /// Never.
    Off,
    /// Only while the incumbent is shorter than the size threshold.
    #[default]
    Auto,
}

impl std::fmt::Display for GapMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapMode::On => write!(f, "on"),
            GapMode::Off => write!(f, "off"),
            GapMode::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for GapMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" | "true" | "force" => Ok(GapMode::On),
            "off" | "false" => Ok(GapMode::Off),
            "auto" => Ok(GapMode::Auto),
            _ => anyhow::bail!("Invalid gap mode '{}'. Valid values: on, off, auto", s),
        }
    }
}

/// Gap analysis trigger policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapSettings {
    pub mode: GapMode,
    /// Character length at or above which `Auto` skips analysis.
    pub size_threshold: usize,
}

impl Default for GapSettings {
    fn default() -> Self {
        Self {
            mode: GapMode::default(),
            size_threshold: DEFAULT_GAP_SIZE_THRESHOLD,
        }
    }
}

impl GapSettings {
    /// Whether gap analysis should run against an incumbent of this length.
    pub fn should_run(&self, incumbent: &str) -> bool {
        match self.mode {
            GapMode::On => true,
            GapMode::Off => false,
            GapMode::Auto => incumbent.chars().count() < self.size_threshold,
        }
    }
}

/// Identifiers attached to every log line of a run.
///
/// Passed by value through [`SessionConfig`] so callers running many
/// sessions (one per document chunk, say) can tell them apart in the logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContext {
    /// Free-form label for this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Identifier of the job or pipeline that owns this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl LogContext {
    pub fn labeled(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            parent_id: None,
        }
    }

    pub fn with_parent_id(mut self, id: &str) -> Self {
        self.parent_id = Some(id.to_string());
        self
    }
}

/// Everything one refinement run needs.
///
/// Construct with [`SessionConfig::new`] and adjust with the `with_*`
/// setters; defaults are applied at construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory holding the `best` and `candidate` slots.
    pub session_dir: PathBuf,
    /// The original task prompt.
    pub prompt: String,
    pub criteria: CriteriaSource,
    /// Total generations allowed, including the initial one.
    pub max_iterations: u32,
    /// Judges per comparison panel.
    pub judges: u32,
    /// Oracle model hint.
    pub model: Option<String>,
    pub gap: GapSettings,
    /// Consecutive stable iterations required before a gap-based stop.
    pub stability_window: u32,
    /// Proportional gap reduction below which an iteration counts as stable.
    pub min_improvement: f64,
    pub log_context: LogContext,
}

impl SessionConfig {
    pub fn new(session_dir: impl Into<PathBuf>, prompt: impl Into<String>) -> Self {
        Self {
            session_dir: session_dir.into(),
            prompt: prompt.into(),
            criteria: CriteriaSource::None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            judges: DEFAULT_JUDGES,
            model: None,
            gap: GapSettings::default(),
            stability_window: DEFAULT_STABILITY_WINDOW,
            min_improvement: DEFAULT_MIN_IMPROVEMENT,
            log_context: LogContext::default(),
        }
    }

    /// Start from the `[refinement]` and `[oracle]` defaults of a loaded config.
    pub fn from_temper_config(
        config: &TemperConfig,
        session_dir: impl Into<PathBuf>,
        prompt: impl Into<String>,
    ) -> Self {
        let refinement = &config.toml.refinement;
        Self::new(session_dir, prompt)
            .with_max_iterations(refinement.max_iterations)
            .with_judges(refinement.judges)
            .with_model(config.model())
            .with_gap_mode(refinement.gap_mode)
            .with_gap_size_threshold(refinement.gap_size_threshold)
            .with_stability_window(refinement.stability_window)
            .with_min_improvement(refinement.min_improvement)
    }

    pub fn with_criteria(mut self, criteria: CriteriaSource) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_criteria_text(self, text: &str) -> Self {
        self.with_criteria(CriteriaSource::Text(text.to_string()))
    }

    pub fn with_criteria_file(self, path: &Path) -> Self {
        self.with_criteria(CriteriaSource::File(path.to_path_buf()))
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_judges(mut self, judges: u32) -> Self {
        self.judges = judges;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_gap_mode(mut self, mode: GapMode) -> Self {
        self.gap.mode = mode;
        self
    }

    pub fn with_gap_size_threshold(mut self, threshold: usize) -> Self {
        self.gap.size_threshold = threshold;
        self
    }

    pub fn with_stability_window(mut self, window: u32) -> Self {
        self.stability_window = window;
        self
    }

    pub fn with_min_improvement(mut self, min_improvement: f64) -> Self {
        self.min_improvement = min_improvement;
        self
    }

    pub fn with_log_context(mut self, context: LogContext) -> Self {
        self.log_context = context;
        self
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.trim().is_empty() {
            return Err(ConfigError::EmptyPrompt);
        }
        if self.session_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptySessionDir);
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "max_iterations",
                message: "must be at least 1".to_string(),
            });
        }
        if self.judges == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "judges",
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.min_improvement) {
            return Err(ConfigError::InvalidSetting {
                field: "min_improvement",
                message: format!("{} is outside 0.0..=1.0", self.min_improvement),
            });
        }
        Ok(())
    }
}
