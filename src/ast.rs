//! # Expression trees
//!
//! Node types produced by the parser and walked by the evaluator.
//!
//! - **[tokens]** - Entries on the parser's output and operator stacks
//! - **[expressions]** - The compiled [`Ast`], projection kinds and slices
//! - **[operators]** - Binary and unary operators with their precedence table
//!
//! ## Projections
//!
//! ```text
//! people[*].name         list projection; `.name` applies per element
//! people[*].name | [0]   the pipe ends the projection; `[0]` sees the whole list
//! reservations[].instances[]
//!                        flatten twice
//! ```
//!
//! ## Precedence
//!
//! From tightest to loosest: `!` and unary `-`, `* / % //`, `+ -`,
//! `< <= > >=`, `== !=`, `&&`, `||`, projections, `|`, `&expr`.
pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::{normalize_index, Ast, ProjectionKind, Slice};
pub use operators::{yields_to, BinaryOperator, Precedence, UnaryOperator};
pub use tokens::Token;
