//! JSON rendering for command results.

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<String, CliError> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::JsonCompact => serde_json::to_string(value)?,
    };
    Ok(text)
}

pub fn print<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<(), CliError> {
    println!("{}", render(value, format)?);
    Ok(())
}
