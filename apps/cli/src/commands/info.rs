//! Info command implementation.

use super::CommandContext;
use anyhow::Result;
use colored::Colorize;

pub fn execute(context: &CommandContext, json_output: bool) -> Result<()> {
    let service = context.service()?;
    let loaded = service.load(None);
    let info = service.model_info();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!();
    println!("{}", "Model bank".bold().cyan());
    println!();
    let Some(version) = info.version.as_ref().filter(|_| loaded) else {
        println!("  {}", "No trained models found.".dimmed());
        println!();
        println!("  {}", "Tip: run `airq train` to produce a model version.".dimmed());
        println!();
        return Ok(());
    };
    println!("  Version:  {}", version.to_string().cyan());
    if let Some(at) = info.trained_at {
        println!("  Trained:  {}", at.to_rfc3339());
    }
    println!("  State:    {:?}", info.state);
    println!("  Samples:  {}", info.samples);
    println!("  Features: {}", info.feature_count);
    let targets: Vec<String> = info.targets.iter().map(ToString::to_string).collect();
    println!("  Targets:  {}", targets.join(", "));
    println!();
    Ok(())
}
