//! Refinement session command: `temper refine`.

use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use temper::config::{LogContext, SessionConfig};
use temper::oracle::ClaudeCliOracle;
use temper::refine::{RefinementOutcome, RefinementRunner};
use temper::temper_config::TemperConfig;

use super::super::RefineArgs;

fn resolve(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}

fn read_prompt(project_dir: &Path, args: &RefineArgs) -> Result<String> {
    match (&args.prompt, &args.prompt_file) {
        (Some(prompt), _) => Ok(prompt.clone()),
        (None, Some(path)) => {
            let path = resolve(project_dir, path);
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))
        }
        (None, None) => anyhow::bail!("Either --prompt or --prompt-file is required"),
    }
}

/// Fresh session directory under `sessions_dir`, unique per run.
fn default_session_dir(sessions_dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let run_id = uuid::Uuid::new_v4().simple().to_string();
    sessions_dir.join(format!("{}-{}", stamp, &run_id[..8]))
}

/// Build the session settings: temper.toml, then env, then CLI flags.
pub fn session_config(config: &TemperConfig, args: &RefineArgs) -> Result<SessionConfig> {
    let project_dir = &config.project_dir;
    let session_dir = match &args.session_dir {
        Some(dir) => resolve(project_dir, dir),
        None => default_session_dir(&config.sessions_dir()),
    };
    let prompt = read_prompt(project_dir, args)?;

    let mut session = SessionConfig::from_temper_config(config, session_dir, prompt);
    if let Some(ref text) = args.criteria {
        session = session.with_criteria_text(text);
    }
    if let Some(ref path) = args.criteria_file {
        session = session.with_criteria_file(&resolve(project_dir, path));
    }
    if let Some(n) = args.max_iterations {
        session = session.with_max_iterations(n);
    }
    if let Some(n) = args.judges {
        session = session.with_judges(n);
    }
    if args.model.is_some() {
        session = session.with_model(args.model.clone());
    }
    if let Some(mode) = args.gap_mode {
        session = session.with_gap_mode(mode);
    }
    if let Some(threshold) = args.gap_threshold {
        session = session.with_gap_size_threshold(threshold);
    }
    if let Some(window) = args.stability_window {
        session = session.with_stability_window(window);
    }
    if let Some(min) = args.min_improvement {
        session = session.with_min_improvement(min);
    }
    if let Some(ref label) = args.label {
        session = session.with_log_context(LogContext::labeled(label));
    }
    Ok(session)
}

pub async fn cmd_refine(project_dir: &Path, args: &RefineArgs) -> Result<()> {
    let config = TemperConfig::new(project_dir.to_path_buf())?;
    let session = session_config(&config, args)?;

    let oracle = Arc::new(ClaudeCliOracle::new(config.oracle_config()));
    let outcome = RefinementRunner::new(oracle)
        .run(&session)
        .await
        .context("Invalid refinement settings")?;

    match outcome {
        RefinementOutcome::Completed { artifact, report } => {
            match &args.output {
                Some(path) => {
                    let path = resolve(&config.project_dir, path);
                    std::fs::write(&path, &artifact)
                        .with_context(|| format!("Failed to write output: {}", path.display()))?;
                    eprintln!(
                        "{} {}",
                        style("Wrote").green().bold(),
                        style(path.display()).dim()
                    );
                }
                None if artifact.ends_with('\n') => print!("{}", artifact),
                None => println!("{}", artifact),
            }
            eprintln!(
                "{} {}",
                style("Refinement complete:").green().bold(),
                report.summary()
            );
            eprintln!(
                "  {} {}",
                style("Session:").dim(),
                session.session_dir.display()
            );
            Ok(())
        }
        RefinementOutcome::Failed { reason } => {
            eprintln!("{} {}", style("Refinement failed:").red().bold(), reason);
            anyhow::bail!("Refinement failed: {}", reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;
    use tempfile::tempdir;

    fn refine_args(argv: &[&str]) -> RefineArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Refine(args) => args,
            _ => panic!("Expected refine command"),
        }
    }

    #[test]
    fn test_default_session_dirs_are_distinct() {
        let dir = tempdir().unwrap();
        let config = TemperConfig::new(dir.path().to_path_buf()).unwrap();
        let args = refine_args(&["temper", "refine", "--prompt", "p"]);

        let first = session_config(&config, &args).unwrap();
        let second = session_config(&config, &args).unwrap();

        assert_ne!(first.session_dir, second.session_dir);
        assert!(first.session_dir.starts_with(config.sessions_dir()));
        assert!(second.session_dir.starts_with(config.sessions_dir()));
    }

    #[test]
    fn test_explicit_session_dir_resolved_against_project() {
        let dir = tempdir().unwrap();
        let config = TemperConfig::new(dir.path().to_path_buf()).unwrap();
        let args = refine_args(&["temper", "refine", "--prompt", "p", "--session-dir", "s1"]);

        let session = session_config(&config, &args).unwrap();
        assert_eq!(session.session_dir, config.project_dir.join("s1"));
    }
}
