//! Execute JMESPath expressions against JSON input

use super::{parse_input, CliError};
use crate::{Expression, Options};

/// Options for the search command
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// The expression to evaluate
    pub expression: String,
    /// JSON input string
    pub input: Option<String>,
    /// Only validate syntax, don't execute
    pub syntax_only: bool,
    /// Abort after this many evaluation steps
    pub step_budget: Option<usize>,
}

/// Result of a search
#[derive(Debug)]
pub enum SearchResult {
    /// Syntax validation passed
    SyntaxValid,
    /// Expression evaluated with JSON output
    Success(serde_json::Value),
}

pub fn execute_search(options: &SearchOptions) -> Result<SearchResult, CliError> {
    let expression = Expression::compile(&options.expression)?;
    if options.syntax_only {
        return Ok(SearchResult::SyntaxValid);
    }

    let document = parse_input(options.input.as_deref())?;

    let mut eval_options = Options::from_env();
    if let Some(budget) = options.step_budget {
        eval_options = eval_options.with_step_budget(budget);
    }
    let output = expression.search_with(&document, &eval_options)?;
    Ok(SearchResult::Success(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(expression: &str, input: Option<&str>) -> SearchOptions {
        SearchOptions {
            expression: expression.to_string(),
            input: input.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn syntax_only_skips_input() {
        let result = execute_search(&SearchOptions {
            syntax_only: true,
            ..options("a.b[0]", None)
        })
        .unwrap();
        assert!(matches!(result, SearchResult::SyntaxValid));
    }

    #[test]
    fn search_evaluates() {
        match execute_search(&options("a.b", Some(r#"{"a": {"b": [1, 2]}}"#))).unwrap() {
            SearchResult::Success(value) => assert_eq!(value, json!([1, 2])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(matches!(
            execute_search(&options("a", None)),
            Err(CliError::NoInput)
        ));
    }

    #[test]
    fn bad_expression_is_a_parse_error() {
        assert!(matches!(
            execute_search(&options("a[", Some("{}"))),
            Err(CliError::Parse(_))
        ));
    }

    #[test]
    fn budget_is_enforced() {
        let result = execute_search(&SearchOptions {
            step_budget: Some(2),
            ..options("a[*].b[*].c", Some(r#"{"a": [{"b": [{"c": 1}, {"c": 2}]}]}"#))
        });
        assert!(matches!(result, Err(CliError::Eval(_))));
    }
}
