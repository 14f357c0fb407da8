//! Unified configuration for temper, read from `.temper/temper.toml`.
//!
//! Layered: file → environment → CLI flags. Every field has a default, so a
//! missing file is equivalent to an empty one.
//!
//! # Configuration File Format
//!
//! ```toml
//! [oracle]
//! command = "claude"
//! args = []
//! model = "sonnet"
//! timeout_secs = 600
//! skip_permissions = false
//!
//! [refinement]
//! max_iterations = 3
//! judges = 1
//! gap_mode = "auto"
//! gap_size_threshold = 10000
//! stability_window = 2
//! min_improvement = 0.05
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{
    DEFAULT_GAP_SIZE_THRESHOLD, DEFAULT_JUDGES, DEFAULT_MAX_ITERATIONS, DEFAULT_MIN_IMPROVEMENT,
    DEFAULT_STABILITY_WINDOW, GapMode,
};
use crate::oracle::ClaudeCliOracleConfig;

/// Environment variable overriding `[oracle].command`.
pub const ORACLE_CMD_ENV: &str = "TEMPER_ORACLE_CMD";
/// Environment variable overriding `[oracle].model`.
pub const MODEL_ENV: &str = "TEMPER_MODEL";

/// Oracle transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSection {
    /// Command to spawn (default: "claude")
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments placed before the generated flags
    #[serde(default)]
    pub args: Vec<String>,
    /// Model hint passed as `--model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether to pass `--dangerously-skip-permissions`
    #[serde(default)]
    pub skip_permissions: bool,
}

fn default_command() -> String {
    ClaudeCliOracleConfig::default().command
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            model: None,
            timeout_secs: default_timeout_secs(),
            skip_permissions: false,
        }
    }
}

/// Default refinement settings for every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_judges")]
    pub judges: u32,
    #[serde(default)]
    pub gap_mode: GapMode,
    #[serde(default = "default_gap_size_threshold")]
    pub gap_size_threshold: usize,
    #[serde(default = "default_stability_window")]
    pub stability_window: u32,
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_judges() -> u32 {
    DEFAULT_JUDGES
}

fn default_gap_size_threshold() -> usize {
    DEFAULT_GAP_SIZE_THRESHOLD
}

fn default_stability_window() -> u32 {
    DEFAULT_STABILITY_WINDOW
}

fn default_min_improvement() -> f64 {
    DEFAULT_MIN_IMPROVEMENT
}

impl Default for RefinementSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            judges: default_judges(),
            gap_mode: GapMode::default(),
            gap_size_threshold: default_gap_size_threshold(),
            stability_window: default_stability_window(),
            min_improvement: default_min_improvement(),
        }
    }
}

/// The complete temper.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemperToml {
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub refinement: RefinementSection,
}

impl TemperToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse temper.toml")
    }

    /// Load from `<temper_dir>/temper.toml`, or defaults if it doesn't exist.
    pub fn load_or_default(temper_dir: &Path) -> Result<Self> {
        let config_path = temper_dir.join("temper.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize temper.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let r = &self.refinement;

        if self.oracle.command.trim().is_empty() {
            warnings.push("oracle.command is empty".to_string());
        }
        if self.oracle.timeout_secs == 0 {
            warnings.push("oracle.timeout_secs is 0; every call will time out".to_string());
        }
        if r.max_iterations == 0 {
            warnings.push("refinement.max_iterations must be at least 1".to_string());
        }
        if r.max_iterations == 1 {
            warnings.push(
                "refinement.max_iterations = 1 performs the initial generation only".to_string(),
            );
        }
        if r.judges == 0 {
            warnings.push("refinement.judges must be at least 1".to_string());
        }
        if r.judges > 1 && r.judges % 2 == 0 {
            warnings.push(format!(
                "refinement.judges = {} is even; ties keep the incumbent",
                r.judges
            ));
        }
        if !(0.0..=1.0).contains(&r.min_improvement) {
            warnings.push(format!(
                "refinement.min_improvement {} is outside 0.0..=1.0",
                r.min_improvement
            ));
        }
        if r.gap_mode == GapMode::Auto && r.gap_size_threshold == 0 {
            warnings.push(
                "refinement.gap_size_threshold = 0 disables automatic gap analysis".to_string(),
            );
        }

        warnings
    }
}

/// Loaded configuration plus the paths it came from.
#[derive(Debug, Clone)]
pub struct TemperConfig {
    /// Path to the project directory
    pub project_dir: PathBuf,
    /// Path to the .temper directory
    pub temper_dir: PathBuf,
    /// Parsed temper.toml
    pub toml: TemperToml,
}

impl TemperConfig {
    /// Load the configuration for a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let temper_dir = project_dir.join(".temper");
        let toml = TemperToml::load_or_default(&temper_dir)?;

        Ok(Self {
            project_dir,
            temper_dir,
            toml,
        })
    }

    /// Path to temper.toml.
    pub fn config_file(&self) -> PathBuf {
        self.temper_dir.join("temper.toml")
    }

    /// Default parent directory for session directories.
    pub fn sessions_dir(&self) -> PathBuf {
        self.temper_dir.join("sessions")
    }

    /// Oracle command (env → file).
    pub fn oracle_command(&self) -> String {
        std::env::var(ORACLE_CMD_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.toml.oracle.command.clone())
    }

    /// Model hint (env → file).
    pub fn model(&self) -> Option<String> {
        std::env::var(MODEL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.toml.oracle.model.clone())
    }

    /// Settings for the default CLI oracle.
    pub fn oracle_config(&self) -> ClaudeCliOracleConfig {
        ClaudeCliOracleConfig::default()
            .with_command(&self.oracle_command())
            .with_leading_args(self.toml.oracle.args.clone())
            .with_timeout(Duration::from_secs(self.toml.oracle.timeout_secs))
            .with_skip_permissions(self.toml.oracle.skip_permissions)
            .with_working_dir(self.project_dir.clone())
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
