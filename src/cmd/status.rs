//! Session history display: `temper status`.

use anyhow::Result;
use console::style;
use std::path::Path;
use temper::refine::{IterationAction, SessionPhase, load_history};

pub fn cmd_status(project_dir: &Path, session_dir: &Path) -> Result<()> {
    let dir = if session_dir.is_absolute() {
        session_dir.to_path_buf()
    } else {
        project_dir.join(session_dir)
    };
    let report = load_history(&dir)?;

    println!();
    println!("{}", style("Refinement Session").bold().cyan());
    println!("  Directory: {}", dir.display());
    println!("  Run:       {}", report.run_id);
    if let Some(ref label) = report.log_context.label {
        println!("  Label:     {}", label);
    }
    let phase = match report.phase {
        SessionPhase::Done => style(report.phase.to_string()).green(),
        SessionPhase::Failed => style(report.phase.to_string()).red(),
        _ => style(report.phase.to_string()).yellow(),
    };
    println!("  Status:    {}", phase);
    println!(
        "  Started:   {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(finished) = report.finished_at {
        println!("  Finished:  {}", finished.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(origin) = report.criteria_origin {
        println!("  Criteria:  {:?}", origin);
    }
    println!();

    if !report.iterations.is_empty() {
        println!("{}", style("Iterations").bold());
        for record in &report.iterations {
            let action = match record.action {
                IterationAction::Promoted => style(record.action.to_string()).green(),
                IterationAction::Retained => style(record.action.to_string()).dim(),
                IterationAction::Stopped => style(record.action.to_string()).cyan(),
                IterationAction::Skipped => style(record.action.to_string()).yellow(),
            };
            let recommendation = record
                .recommendation
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            let gap = record
                .gap_len
                .map(|g| g.to_string())
                .unwrap_or_else(|| "-".to_string());
            let votes = record
                .votes
                .map(|v| format!("  votes {}-{}", v.challenger, v.incumbent))
                .unwrap_or_default();
            println!(
                "  #{:<3} rec {}  gap {:<6} stable {}  {}{}",
                record.iteration, recommendation, gap, record.stable_count, action, votes
            );
            for fault in &record.faults {
                println!("        {} {}", style("!").yellow(), style(fault).dim());
            }
        }
        println!();
    }

    for fault in &report.faults {
        println!("  {} {}", style("!").yellow(), fault);
    }
    println!("  {}", report.summary());
    println!();

    Ok(())
}
