//! Versions command implementation.

use super::CommandContext;
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

pub fn execute(context: &CommandContext, json_output: bool) -> Result<()> {
    let service = context.service()?;
    let manifests = service.manifests().context("Failed to list model versions")?;

    if json_output {
        let out: Vec<_> = manifests
            .iter()
            .map(|m| {
                json!({
                    "version": m.version,
                    "created_at": m.created_at,
                    "samples": m.samples,
                    "features": m.schema_len,
                    "targets": m.targets.keys().collect::<Vec<_>>(),
                    "batch_id": m.batch_id,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Model versions ({})", manifests.len()).bold().cyan());
    println!();

    if manifests.is_empty() {
        println!("  {}", "No saved versions.".dimmed());
        println!();
        return Ok(());
    }

    println!("{:<22} {:<26} {:>8} {}", "Version", "Created", "Samples", "Targets");
    println!("{}", "─".repeat(80));
    for m in &manifests {
        let targets: Vec<String> = m.targets.keys().map(ToString::to_string).collect();
        println!(
            "{:<22} {:<26} {:>8} {}",
            m.version.to_string().cyan(),
            m.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed(),
            m.samples,
            targets.join(", ")
        );
    }
    println!();
    Ok(())
}
