//! # JSON Schema
//!
//! Validation against the structural keywords of JSON Schema draft 7: `type`, `enum`,
//! `const`, `required`, `properties`, `patternProperties`, `additionalProperties`,
//! `items`, `additionalItems`, `contains`, `uniqueItems`, `propertyNames`,
//! `dependencies`, `allOf`, `anyOf`, `oneOf`, `not`, `if`/`then`/`else` and `$ref`.
//! Annotation and format keywords are ignored.
//!
//! Schemas compile once into an arena of nodes; references become slot indices, so
//! recursive schemas need no special handling at validation time.

pub mod compiler;
pub mod resolver;
pub mod validator;

use serde_json::Value as Json;
use thiserror::Error;

use crate::evaluator::Options;

pub use compiler::{JsonType, Keyword, SchemaNode};
pub use resolver::{NoResolver, SchemaResolver};
pub use validator::ValidationError;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid schema at '{pointer}': {message}")]
    InvalidSchema { pointer: String, message: String },

    #[error("unresolved reference '{0}'")]
    UnresolvedReference(String),

    #[error("invalid URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },
}

/// A compiled schema.
///
/// # Examples
///
/// ```
/// use quarry::JsonSchema;
/// use serde_json::json;
///
/// let schema = JsonSchema::compile(&json!({
///     "type": "object",
///     "required": ["id"],
///     "properties": {"id": {"type": "integer"}}
/// })).unwrap();
///
/// assert!(schema.is_valid(&json!({"id": 7})));
/// let errors = schema.validate(&json!({"id": "7"})).unwrap_err();
/// assert_eq!(errors[0].instance_location, "/id");
/// assert_eq!(errors[0].keyword, "type");
/// ```
#[derive(Debug, Clone)]
pub struct JsonSchema {
    nodes: Vec<SchemaNode>,
    root: usize,
}

impl JsonSchema {
    pub fn compile(schema: &Json) -> Result<Self, SchemaError> {
        Self::compile_with(schema, &NoResolver)
    }

    /// Compiles `schema`, loading documents it references from `resolver`.
    pub fn compile_with(schema: &Json, resolver: &dyn SchemaResolver) -> Result<Self, SchemaError> {
        let (nodes, root) = compiler::Compiler::new(resolver).compile(schema)?;
        Ok(JsonSchema { nodes, root })
    }

    /// Every error in `instance`, or `Ok` if there are none.
    pub fn validate(&self, instance: &Json) -> Result<(), Vec<ValidationError>> {
        self.validate_with(instance, &Options::default())
    }

    /// Like [`JsonSchema::validate`], failing once schema nesting passes
    /// `options.max_depth`.
    pub fn validate_with(&self, instance: &Json, options: &Options) -> Result<(), Vec<ValidationError>> {
        let errors = validator::Validator::new(&self.nodes, options.max_depth).validate(self.root, instance);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn is_valid(&self, instance: &Json) -> bool {
        self.validate(instance).is_ok()
    }

    /// Number of compiled nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for JsonSchema {
    /// The schema `true`.
    fn default() -> Self {
        JsonSchema {
            nodes: vec![SchemaNode::Bool(true)],
            root: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recursive_reference_compiles() {
        let schema = JsonSchema::compile(&json!({
            "type": "object",
            "properties": {"next": {"$ref": "#"}}
        }))
        .unwrap();
        assert!(schema.is_valid(&json!({"next": {"next": {}}})));
        assert!(!schema.is_valid(&json!({"next": {"next": 1}})));
    }

    #[test]
    fn self_reference_hits_the_depth_guard() {
        let schema = JsonSchema::compile(&json!({"$ref": "#"})).unwrap();
        let errors = schema
            .validate_with(&json!(1), &Options::default().with_max_depth(8))
            .unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn default_accepts_everything() {
        assert!(JsonSchema::default().is_valid(&json!({"anything": [1, 2]})));
    }
}
