//! # JSONPath selectors
//!
//! A second query language over the same value model, operator table and function
//! registry. Unlike JMESPath expressions, JSONPath queries report where each match was
//! found.
//!
//! ```text
//! $.store.book[*].author           every author
//! $..price                         every price, at any depth
//! $.store.book[?@.price < 10]      cheap books
//! $.store.book[?@.title =~ /^s/i]  titles starting with s or S
//! $.store.book[0].author^          the first book (parent of its author)
//! $['store']['bicycle', 'book']    union of two members
//! ```
//!
//! Locations render as normalized paths (`$['store']['book'][0]`) or JSON pointers
//! (`/store/book/0`).

pub mod filter;
pub mod parser;
pub mod selector;

use std::fmt;

use serde_json::Value as Json;

use crate::{
    error::{EvalError, ParseError},
    evaluator::{DynamicResources, Options},
    functions::FunctionRegistry,
    path::{self, PathElement},
    value::Value,
};

pub use filter::FilterExpr;
pub use parser::PathParser;
pub use selector::{Selector, SelectorKind};

/// A value matched by a JSONPath query and the location it was found at.
#[derive(Debug, Clone)]
pub struct Node<'a> {
    pub location: Vec<PathElement>,
    pub value: Value<'a>,
}

impl Node<'_> {
    /// Normalized path, e.g. `$['a'][0]`.
    pub fn path(&self) -> String {
        path::normalized(&self.location)
    }

    /// JSON pointer, e.g. `/a/0`.
    pub fn pointer(&self) -> String {
        path::pointer(&self.location)
    }

    pub fn to_json(&self) -> Json {
        self.value.to_json()
    }
}

/// A compiled JSONPath query.
///
/// # Examples
///
/// ```
/// use quarry::JsonPath;
/// use serde_json::json;
///
/// let path = JsonPath::compile("$.users[?@.active].name").unwrap();
/// let doc = json!({"users": [{"name": "a", "active": true}, {"name": "b", "active": false}]});
/// assert_eq!(path.query(&doc), json!(["a"]));
/// assert_eq!(path.locate(&doc), vec!["$['users'][0]['name']"]);
/// ```
#[derive(Debug, Clone)]
pub struct JsonPath {
    selector: Selector,
    source: String,
}

impl JsonPath {
    pub fn compile(text: &str) -> Result<Self, ParseError> {
        Self::compile_with(text, FunctionRegistry::builtins())
    }

    /// Compiles `text`, resolving filter function names in `registry`.
    pub fn compile_with(text: &str, registry: &FunctionRegistry) -> Result<Self, ParseError> {
        let selector = PathParser::new(text, registry).parse()?;
        Ok(JsonPath {
            selector,
            source: text.to_string(),
        })
    }

    /// Every match in document order.
    pub fn select<'a>(&'a self, document: &'a Json) -> Vec<Node<'a>> {
        self.select_with(document, &Options::default())
            .unwrap_or_default()
    }

    /// # Errors
    ///
    /// [`EvalError::BudgetExhausted`] when the step budget runs out.
    pub fn select_with<'a>(&'a self, document: &'a Json, options: &Options) -> Result<Vec<Node<'a>>, EvalError> {
        let mut resources = DynamicResources::new(document, *options);
        let root = resources.root();
        let mut nodes = Vec::new();
        self.selector
            .select(&mut resources, &mut Vec::new(), root, &mut nodes);
        if resources.is_exhausted() {
            return Err(EvalError::BudgetExhausted(
                options.step_budget.unwrap_or_default(),
            ));
        }
        Ok(nodes)
    }

    /// The matched values as a JSON array.
    pub fn query(&self, document: &Json) -> Json {
        Json::Array(self.select(document).iter().map(Node::to_json).collect())
    }

    /// The normalized paths of every match.
    pub fn locate(&self, document: &Json) -> Vec<String> {
        self.select(document).iter().map(Node::path).collect()
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
