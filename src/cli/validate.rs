//! Validate JSON input against a schema

use super::{parse_input, CliError};
use crate::{JsonSchema, Options};

#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Schema document text
    pub schema: String,
    pub input: Option<String>,
}

/// `Ok` when the input is valid, [`CliError::Invalid`] with every error otherwise.
pub fn execute_validate(options: &ValidateOptions) -> Result<(), CliError> {
    let schema: serde_json::Value = serde_json::from_str(&options.schema)?;
    let schema = JsonSchema::compile(&schema)?;
    let document = parse_input(options.input.as_deref())?;
    schema
        .validate_with(&document, &Options::from_env())
        .map_err(CliError::Invalid)
}
