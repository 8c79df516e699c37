//! Collect command implementation.

use super::{read_records, CommandContext};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

pub fn execute(context: &CommandContext, input: &Path) -> Result<()> {
    let records = read_records(input)?;
    let added = records.len();

    let mut buffer = context.buffer()?;
    buffer.extend(records);
    buffer
        .save_jsonl(&context.config.buffer_path)
        .with_context(|| format!("Failed to write observation buffer: {}", context.config.buffer_path.display()))?;

    println!(
        "{} {} record(s); buffer holds {}/{}",
        "Collected".green(),
        added,
        buffer.len(),
        buffer.capacity()
    );
    Ok(())
}
