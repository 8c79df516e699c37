//! Training command implementation.

use super::CommandContext;
use airq_core::{read_jsonl_records, TrainingReport};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::PathBuf;

pub async fn execute(context: &CommandContext, data: Option<PathBuf>, append: bool, json_output: bool) -> Result<()> {
    let service = context.service()?;

    let report = match data {
        Some(path) => {
            let new = read_jsonl_records(&path)
                .with_context(|| format!("Failed to read training data: {}", path.display()))?;
            if append {
                let mut buffer = context.buffer()?;
                let existing = buffer.records();
                buffer.extend(new.clone());
                buffer.save_jsonl(&context.config.buffer_path)?;
                service.retrain_with_new_data(new, Some(existing)).await?
            } else {
                service.train(new).await?
            }
        }
        None => {
            let records = context.buffer()?.records();
            if records.is_empty() {
                bail!("Observation buffer is empty. Run `airq collect <file>` or pass `--data <file.jsonl>`.");
            }
            service.train(records).await?
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &TrainingReport) {
    println!();
    match &report.version {
        Some(version) => println!("{} {}", "Training complete".bold().green(), version.to_string().cyan()),
        None => println!("{}", "Training finished without a usable target; nothing saved".bold().yellow()),
    }
    println!();

    if !report.metrics.is_empty() {
        println!("{:<8} {:<18} {:>8} {:>10} {:>10} {:>8}", "Target", "Model", "R²", "MSE", "MAE", "Samples");
        println!("{}", "─".repeat(68));
        for (target, m) in &report.metrics {
            println!(
                "{:<8} {:<18} {:>8.3} {:>10.3} {:>10.3} {:>8}",
                target.to_string().cyan(),
                m.family.to_string(),
                m.r2,
                m.mse,
                m.mae,
                m.samples_used
            );
        }
        println!();
    }

    for (target, reason) in &report.skipped {
        println!("  {} {}: {}", "skipped".yellow(), target, reason.dimmed());
    }
    if !report.skipped.is_empty() {
        println!();
    }
}
