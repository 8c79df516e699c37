//! Predict and batch command implementations.

use super::{read_records, CommandContext};
use airq_core::{read_jsonl_records, Prediction};
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::Path;

pub fn execute(context: &CommandContext, input: &Path, version: Option<String>, json_output: bool) -> Result<()> {
    let service = context.loaded_service(version.as_deref())?;
    let records = read_records(input)?;
    let Some(record) = records.first() else {
        anyhow::bail!("No record found in {}", input.display());
    };

    let prediction = service.predict(record).context("Prediction failed")?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    println!();
    println!("{}", "Predicted concentrations".bold().cyan());
    print_prediction(&prediction);
    println!();
    Ok(())
}

pub fn execute_batch(context: &CommandContext, input: &Path, version: Option<String>, json_output: bool) -> Result<()> {
    let service = context.loaded_service(version.as_deref())?;
    let records =
        read_jsonl_records(input).with_context(|| format!("Failed to read records: {}", input.display()))?;

    let results = service.predict_batch(&records);

    if json_output {
        let out: Vec<_> = results
            .iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(prediction) => json!({ "index": index, "prediction": prediction }),
                Err(err) => json!({ "index": index, "error": err.to_string() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Batch predictions ({})", results.len()).bold().cyan());
    for (index, result) in results.iter().enumerate() {
        println!();
        println!("  {}", format!("#{index}").bold());
        match result {
            Ok(prediction) => print_prediction(prediction),
            Err(err) => println!("  {} {}", "error:".red(), err),
        }
    }
    println!();
    Ok(())
}

fn print_prediction(prediction: &Prediction) {
    if prediction.is_empty() {
        println!("  {}", "No trained targets.".dimmed());
        return;
    }
    for (target, value) in prediction {
        println!("  {:<8} {:>10.2}", target.to_string().cyan(), value);
    }
}
