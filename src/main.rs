use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use temper::config::GapMode;
use temper::logging::{self, LogFormat, LogSettings};

mod cmd;

#[derive(Parser)]
#[command(name = "temper")]
#[command(version, about = "Refine an artifact through oracle critique, regeneration and judging")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format: text, json
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a refinement session and print the final artifact
    Refine(RefineArgs),
    /// Show the history of a session
    Status {
        /// Session directory to inspect
        #[arg(long)]
        session_dir: PathBuf,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct RefineArgs {
    /// Session directory (defaults to .temper/sessions/<timestamp>-<id>)
    #[arg(long)]
    pub session_dir: Option<PathBuf>,

    /// Task prompt
    #[arg(long, conflicts_with = "prompt_file", required_unless_present = "prompt_file")]
    pub prompt: Option<String>,

    /// Read the task prompt from a file
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Evaluation criteria text
    #[arg(long, conflicts_with = "criteria_file")]
    pub criteria: Option<String>,

    /// Read evaluation criteria from a file
    #[arg(long)]
    pub criteria_file: Option<PathBuf>,

    /// Total generations including the initial one
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Judges per comparison panel
    #[arg(long)]
    pub judges: Option<u32>,

    /// Oracle model hint
    #[arg(long)]
    pub model: Option<String>,

    /// Gap analysis mode: on, off, auto
    #[arg(long)]
    pub gap_mode: Option<GapMode>,

    /// Incumbent length (chars) at which auto mode skips gap analysis
    #[arg(long)]
    pub gap_threshold: Option<usize>,

    /// Consecutive stable iterations required to stop
    #[arg(long)]
    pub stability_window: Option<u32>,

    /// Minimum proportional gap reduction (0.0-1.0)
    #[arg(long)]
    pub min_improvement: Option<f64>,

    /// Label attached to every log line of this session
    #[arg(long)]
    pub label: Option<String>,

    /// Write the final artifact here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default temper.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(&LogSettings {
        verbose: cli.verbose,
        format: cli.log_format,
        file: cli.log_file.clone(),
    })?;

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Refine(args) => cmd::cmd_refine(&project_dir, args).await?,
        Commands::Status { session_dir } => cmd::cmd_status(&project_dir, session_dir)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
