//! Typed error hierarchy for temper.
//!
//! Three enums cover the refinement failure taxonomy:
//! - `ConfigError`: invalid session setup, fatal before any oracle call
//! - `OracleError`: a failed or empty oracle response
//! - `IterationFault`: recoverable faults captured per iteration and recorded in history

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that stop a session before the first oracle call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Task prompt is empty")]
    EmptyPrompt,

    #[error("Session directory is not set")]
    EmptySessionDir,

    #[error("Invalid value for {field}: {message}")]
    InvalidSetting { field: &'static str, message: String },

    #[error("Session directory {path} is in use by another run")]
    SessionLocked { path: PathBuf },

    #[error("Failed to prepare session store at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a single oracle call.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Failed to spawn oracle command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Oracle I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle exited with code {0}")]
    NonZeroExit(i32),

    #[error("Oracle returned an empty response")]
    EmptyResponse,
}

/// Step of an iteration in which a fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generation,
    Criteria,
    Critique,
    Candidate,
    Judge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "initial generation"),
            Self::Criteria => write!(f, "criteria"),
            Self::Critique => write!(f, "critique"),
            Self::Candidate => write!(f, "candidate"),
            Self::Judge => write!(f, "judge"),
        }
    }
}

/// A recoverable fault. The loop records it and carries on with the incumbent.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IterationFault {
    #[error("oracle failure during {stage}: {message}")]
    OracleFailure { stage: Stage, message: String },

    #[error("could not parse {field}; defaulted to {default}")]
    ParseFailure { field: String, default: String },

    #[error("gap analysis skipped: {reason}")]
    GapAnalysisFailure { reason: String },

    #[error("failed to persist {slot}: {message}")]
    PersistFailure { slot: String, message: String },
}

impl IterationFault {
    pub fn oracle(stage: Stage, err: &OracleError) -> Self {
        Self::OracleFailure {
            stage,
            message: err.to_string(),
        }
    }

    pub fn parse(field: &str, default: &str) -> Self {
        Self::ParseFailure {
            field: field.to_string(),
            default: default.to_string(),
        }
    }

    pub fn gap(reason: impl Into<String>) -> Self {
        Self::GapAnalysisFailure {
            reason: reason.into(),
        }
    }

    /// True when the fault cost the iteration its candidate.
    pub fn skips_iteration(&self) -> bool {
        matches!(
            self,
            Self::OracleFailure {
                stage: Stage::Critique | Stage::Candidate,
                ..
            }
        )
    }
}
