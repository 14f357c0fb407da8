//! Oracle backed by the Claude CLI in print mode.

use super::{Oracle, OracleRequest};
use crate::errors::OracleError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default timeout for a single oracle call.
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 600;

/// Default Claude command.
pub const DEFAULT_ORACLE_CMD: &str = "claude";

/// Settings for [`ClaudeCliOracle`].
#[derive(Debug, Clone)]
pub struct ClaudeCliOracleConfig {
    /// Command to spawn (default: "claude").
    pub command: String,
    /// Arguments placed before the generated flags.
    pub leading_args: Vec<String>,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Pass `--dangerously-skip-permissions`.
    pub skip_permissions: bool,
    /// Working directory for the spawned process.
    pub working_dir: Option<PathBuf>,
}

impl Default for ClaudeCliOracleConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_ORACLE_CMD.to_string(),
            leading_args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_ORACLE_TIMEOUT_SECS),
            skip_permissions: false,
            working_dir: None,
        }
    }
}

impl ClaudeCliOracleConfig {
    pub fn with_command(mut self, cmd: &str) -> Self {
        self.command = cmd.to_string();
        self
    }

    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_skip_permissions(mut self, skip: bool) -> Self {
        self.skip_permissions = skip;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
}

/// Spawns the Claude CLI once per request, writes the prompt on stdin and
/// returns stdout.
pub struct ClaudeCliOracle {
    config: ClaudeCliOracleConfig,
}

impl ClaudeCliOracle {
    pub fn new(config: ClaudeCliOracleConfig) -> Self {
        Self { config }
    }

    /// Arguments for one request.
    pub fn args_for(&self, request: &OracleRequest) -> Vec<String> {
        let mut args = self.config.leading_args.clone();
        args.push("--print".to_string());
        if self.config.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        if let Some(ref model) = request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }

    /// Full stdin payload: style preamble (if any) followed by the prompt.
    pub fn stdin_payload(request: &OracleRequest) -> String {
        match request.style {
            Some(style) => format!("{}\n\n{}", style.preamble(), request.prompt),
            None => request.prompt.clone(),
        }
    }

    async fn invoke(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(self.args_for(request));

        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| OracleError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(Self::stdin_payload(request).as_bytes())
                .await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OracleError::NonZeroExit(output.status.code().unwrap_or(-1)));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl Oracle for ClaudeCliOracle {
    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let start = Instant::now();
        tracing::debug!(
            command = %self.config.command,
            prompt_chars = request.prompt.len(),
            style = ?request.style,
            "invoking oracle"
        );

        let result = tokio::time::timeout(self.config.timeout, self.invoke(request))
            .await
            .map_err(|_| OracleError::Timeout(self.config.timeout))?;

        match &result {
            Ok(text) => tracing::debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                output_chars = text.len(),
                "oracle completed"
            ),
            Err(e) => tracing::warn!(error = %e, "oracle call failed"),
        }
        result
    }
}
