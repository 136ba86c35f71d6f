//! Execute JSONPath queries against JSON input

use serde_json::Value as Json;

use super::{parse_input, CliError};
use crate::{JsonPath, Options};

/// Options for the path command
#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    pub path: String,
    pub input: Option<String>,
    /// Print normalized paths instead of values
    pub locations: bool,
}

pub fn execute_path(options: &PathOptions) -> Result<Json, CliError> {
    let path = JsonPath::compile(&options.path)?;
    let document = parse_input(options.input.as_deref())?;
    let nodes = path.select_with(&document, &Options::from_env())?;

    let output = if options.locations {
        nodes.iter().map(|node| Json::String(node.path())).collect()
    } else {
        nodes.iter().map(|node| node.to_json()).collect()
    };
    Ok(Json::Array(output))
}
