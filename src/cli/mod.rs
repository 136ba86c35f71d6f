//! CLI support for quarry
//!
//! The subcommands as plain functions over option structs, so other tools can embed
//! them without going through the binary.

mod path;
mod search;
mod validate;

pub use path::{execute_path, PathOptions};
pub use search::{execute_search, SearchOptions, SearchResult};
pub use validate::{execute_validate, ValidateOptions};

use std::io;

use thiserror::Error;

use crate::schema::ValidationError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Parse error: {0}")]
    Parse(#[from] crate::ParseError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] crate::EvalError),

    #[error("Schema error: {0}")]
    Schema(#[from] crate::SchemaError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No input provided. Use --input or pipe JSON to stdin.")]
    NoInput,

    #[error("{}", render_invalid(.0))]
    Invalid(Vec<ValidationError>),
}

fn render_invalid(errors: &[ValidationError]) -> String {
    let mut message = format!("Document is invalid ({} errors)", errors.len());
    for error in errors {
        message.push_str("\n  ");
        message.push_str(&error.to_string());
    }
    message
}

/// Parses the `--input` text or piped stdin.
fn parse_input(input: Option<&str>) -> Result<serde_json::Value, CliError> {
    let text = input.ok_or(CliError::NoInput)?;
    Ok(serde_json::from_str(text)?)
}

/// Serializes a result the way every subcommand prints it.
pub fn render(value: &serde_json::Value, pretty: bool) -> Result<String, CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }?;
    Ok(json)
}
