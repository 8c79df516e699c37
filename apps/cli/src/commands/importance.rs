//! Feature importance command implementation.

use super::{parse_target, CommandContext};
use anyhow::Result;
use colored::Colorize;
use serde_json::json;

pub fn execute(context: &CommandContext, target: &str, top: Option<usize>, json_output: bool) -> Result<()> {
    let target = parse_target(target)?;
    let service = context.loaded_service(None)?;

    let mut ranked = service.feature_importance(target);
    if let Some(n) = top {
        ranked.truncate(n);
    }

    if json_output {
        let out: Vec<_> = ranked.iter().map(|(feature, score)| json!({ "feature": feature, "importance": score })).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Feature importance for {target}").bold().cyan());
    println!();

    if ranked.is_empty() {
        println!("  {}", format!("No trained model for {target}.").dimmed());
        println!();
        return Ok(());
    }

    for (feature, score) in &ranked {
        println!("  {:<28} {:>8.4}", feature, score);
    }
    println!();
    Ok(())
}
