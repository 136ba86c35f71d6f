use std::sync::Arc;

use serde_json::Value as Json;

use crate::{
    ast::{Ast, BinaryOperator, Precedence, UnaryOperator},
    functions::Function,
};

/// One entry on the parser's output or operator stack.
///
/// Group openers (`(`, `[`, `{`, `[?`, `name(`) are pushed twice: as a marker on the
/// output stack, so the closer knows where its operands start, and as a
/// [`Token::LeftParen`] barrier on the operator stack, so pending operators never
/// reduce across the group boundary. `chained` records whether the group hangs off a
/// preceding expression (`foo.[a, b]`, `foo[?x]`, `foo.length(@)`).
#[derive(Debug, Clone)]
pub enum Token {
    /// `@`
    CurrentNode,

    /// `(`; also the barrier for every group on the operator stack
    LeftParen,

    /// `)`
    RightParen,

    BeginMultiSelectList { chained: bool },

    EndMultiSelectList,

    BeginMultiSelectHash { chained: bool },

    EndMultiSelectHash,

    /// `[?`
    BeginFilter { chained: bool },

    EndFilter,

    /// `|`
    Pipe,

    /// `,` between list items, hash entries and arguments
    Separator,

    /// Multi-select hash key
    ///
    /// # Examples
    /// ```text
    /// {name: a}
    /// {"quoted key": a}
    /// ```
    Key(String),

    /// Backtick or raw string literal
    Literal(Json),

    /// A finished operand. `projecting` is set while further `.` and `[` steps
    /// should apply per element; `height` bounds the depth of `ast`.
    Expression {
        ast: Ast,
        projecting: bool,
        height: usize,
    },

    Binary(BinaryOperator),

    /// Prefix `!` or `-`
    Unary(UnaryOperator),

    /// `name(`, opening an argument list
    Function {
        function: Arc<dyn Function>,
        chained: bool,
    },

    EndArguments,

    /// `&`, prefix for expression references
    BeginExpressionType,

    EndOfExpression,
}

impl Token {
    pub fn precedence(&self) -> Precedence {
        match self {
            Token::Binary(op) => op.precedence(),
            Token::Unary(op) => op.precedence(),
            Token::Pipe => Precedence::Pipe,
            Token::BeginExpressionType => Precedence::ExpressionType,
            Token::Expression {
                projecting: true, ..
            } => Precedence::Projection,
            _ => Precedence::Primary,
        }
    }

    pub fn is_right_associative(&self) -> bool {
        match self {
            Token::Binary(op) => op.is_right_associative(),
            Token::Unary(op) => op.is_right_associative(),
            Token::BeginExpressionType => true,
            _ => false,
        }
    }

    /// Operators that wait on the operator stack for their operands.
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            Token::Binary(_) | Token::Unary(_) | Token::Pipe | Token::BeginExpressionType
        )
    }

    /// Output-stack markers that open a group.
    pub fn is_group_marker(&self) -> bool {
        matches!(
            self,
            Token::LeftParen
                | Token::BeginMultiSelectList { .. }
                | Token::BeginMultiSelectHash { .. }
                | Token::BeginFilter { .. }
                | Token::Function { .. }
        )
    }
}
