//! # quarry
//!
//! Queries over `serde_json` documents:
//!
//! * [`Expression`]: JMESPath expressions with projections, filters, slices, pipes,
//!   arithmetic and built-in functions;
//! * [`JsonPath`]: JSONPath selectors that report where each match was found;
//! * [`JsonSchema`]: validation against the structural keywords of JSON Schema draft 7;
//! * [`patch::merge_patch`]: RFC 7386 merge patch.
//!
//! ```
//! use quarry::Expression;
//! use serde_json::json;
//!
//! let expr = Expression::compile("people[?age > `20`].name").unwrap();
//! let doc = json!({"people": [{"name": "George", "age": 30}, {"name": "Mary", "age": 10}]});
//! assert_eq!(expr.search(&doc), json!(["George"]));
//! ```

pub mod ast;
pub mod cli;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod jsonpath;
pub mod lexer;
pub mod parser;
pub mod patch;
pub mod path;
pub mod schema;
pub mod value;

pub use ast::{Ast, BinaryOperator, Token, UnaryOperator};
pub use error::{ErrorKind, EvalError, ParseError, Unmatched};
pub use evaluator::{transform, DynamicResources, Expression, Options};
pub use functions::{Function, FunctionRegistry};
pub use jsonpath::{JsonPath, Node};
pub use lexer::Position;
pub use parser::Parser;
pub use path::PathElement;
pub use schema::{JsonSchema, SchemaError, SchemaResolver, ValidationError};
pub use value::{Kind, Number, Value};
