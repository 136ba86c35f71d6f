//! Error types shared by the parsers and evaluators.
//!
//! Parsing fails hard with a [`ParseError`] carrying the 1-based line and column of the
//! offending character. Evaluation never fails on type mismatches; operators, functions
//! and selectors return [`Unmatched`], which the public entry points turn into `null`.

use thiserror::Error;

use crate::lexer::Position;

/// The reason a parse failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,

    #[error("syntax error")]
    SyntaxError,

    #[error("expected identifier")]
    ExpectedIdentifier,

    #[error("expected ':'")]
    ExpectedColon,

    #[error("expected '.'")]
    ExpectedDot,

    #[error("expected ']'")]
    ExpectedRightBracket,

    #[error("expected ')'")]
    ExpectedRightParen,

    #[error("expected '}}'")]
    ExpectedRightBrace,

    #[error("expected comparator")]
    ExpectedComparator,

    #[error("invalid number literal")]
    InvalidNumber,

    #[error("invalid JSON literal")]
    InvalidLiteral,

    #[error("illegal escape character")]
    IllegalEscapeCharacter,

    #[error("invalid unicode codepoint")]
    InvalidCodepoint,

    #[error("slice step cannot be zero")]
    StepCannotBeZero,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    InvalidArity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),

    #[error("expression nesting is too deep")]
    NestingTooDeep,
}

/// A structural error found while compiling expression text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {line}, column {column}")]
pub struct ParseError {
    pub kind: ErrorKind,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(kind: ErrorKind, position: Position) -> Self {
        ParseError {
            kind,
            line: position.line,
            column: position.column,
        }
    }
}

/// An evaluation step silently produced no value.
///
/// This is the type-error channel: applying `+` to a string, calling `abs` on an array,
/// comparing incompatible operands. It never escapes [`crate::Expression::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("expression produced no value")]
pub struct Unmatched;

/// Errors that abort an evaluation instead of degrading to `null`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("evaluation exceeded the step budget of {0}")]
    BudgetExhausted(usize),
}
