//! Configuration view and validation commands: `temper config`.

use anyhow::Result;
use console::style;
use temper::temper_config::{MODEL_ENV, ORACLE_CMD_ENV, TemperConfig, TemperToml};

use super::super::ConfigCommands;

fn print_toml(toml: &TemperToml) {
    println!("[oracle]");
    println!("  command = \"{}\"", toml.oracle.command);
    if !toml.oracle.args.is_empty() {
        println!("  args = {:?}", toml.oracle.args);
    }
    if let Some(ref model) = toml.oracle.model {
        println!("  model = \"{}\"", model);
    }
    println!("  timeout_secs = {}", toml.oracle.timeout_secs);
    println!("  skip_permissions = {}", toml.oracle.skip_permissions);
    println!();

    let r = &toml.refinement;
    println!("[refinement]");
    println!("  max_iterations = {}", r.max_iterations);
    println!("  judges = {}", r.judges);
    println!("  gap_mode = \"{}\"", r.gap_mode);
    println!("  gap_size_threshold = {}", r.gap_size_threshold);
    println!("  stability_window = {}", r.stability_window);
    println!("  min_improvement = {}", r.min_improvement);
    println!();
}

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    let config = TemperConfig::new(project_dir.to_path_buf())?;
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", style("Temper Configuration").bold().cyan());
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&config.toml);
            } else {
                println!("No temper.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&TemperToml::default());
                println!("Run 'temper config init' to create a temper.toml file.");
                println!();
            }

            println!("Effective values (with env overrides):");
            println!("  command = \"{}\"  ({})", config.oracle_command(), ORACLE_CMD_ENV);
            println!(
                "  model = {}  ({})",
                config
                    .model()
                    .map(|m| format!("\"{}\"", m))
                    .unwrap_or_else(|| "(default)".to_string()),
                MODEL_ENV
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No temper.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();

            if warnings.is_empty() {
                println!("{}", style("Configuration is valid.").green());
            } else {
                println!("{}", style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("temper.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !config.temper_dir.exists() {
                std::fs::create_dir_all(&config.temper_dir)?;
            }

            TemperToml::default().save(&config_path)?;

            println!("Created temper.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [oracle] command, args, model, timeout_secs");
            println!("  - [refinement] max_iterations, judges, gap_mode, stability_window");
            println!();
        }
    }

    Ok(())
}
