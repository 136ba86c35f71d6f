use std::{fmt, sync::Arc};

use serde_json::Value as Json;

use crate::{
    ast::{BinaryOperator, UnaryOperator},
    functions::Function,
};

/// Compiled JMESPath expression tree.
///
/// Trees are immutable once the parser hands them out; evaluation only reads them.
#[derive(Debug, Clone)]
pub enum Ast {
    /// The current node (`@`)
    Identity,

    /// Object property lookup
    ///
    /// # Examples
    /// ```text
    /// foo
    /// "with space"
    /// ```
    Field(String),

    /// Array element; negative indices count from the end
    ///
    /// # Examples
    /// ```text
    /// [0]
    /// [-1]
    /// ```
    Index(i64),

    /// Python-style slice; always appears as the left side of a list projection
    Slice(Slice),

    /// Backtick JSON literal or raw `'string'`
    Literal(Json),

    /// `lhs.rhs`: evaluate `rhs` against the result of `lhs`
    Subexpression { lhs: Box<Ast>, rhs: Box<Ast> },

    /// Evaluate `lhs`, then `rhs` once per element of the result
    ///
    /// # Examples
    /// ```text
    /// people[*].name     List
    /// ages.*             Object
    /// people[?age > `20`] Filter
    /// nested[]           Flatten
    /// ```
    Projection {
        kind: ProjectionKind,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },

    /// `[a, b]` or `x.[a, b]`
    MultiSelectList(Vec<Ast>),

    /// `{k: a, j: b}` or `x.{k: a}`
    MultiSelectHash(Vec<(String, Ast)>),

    Binary {
        op: BinaryOperator,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },

    Unary {
        op: UnaryOperator,
        operand: Box<Ast>,
    },

    /// `lhs | rhs`: materialize `lhs`, stopping any projection
    Pipe { lhs: Box<Ast>, rhs: Box<Ast> },

    /// Call to a registered function; arity already checked for fixed-arity functions
    Function {
        function: Arc<dyn Function>,
        args: Vec<Ast>,
    },

    /// `&expr`, evaluated later by the function that receives it
    ExpressionRef(Box<Ast>),
}

/// How a projection produces the elements it iterates over.
#[derive(Debug, Clone)]
pub enum ProjectionKind {
    /// Array elements (`[*]`, slices)
    List,
    /// Object values (`*`)
    Object,
    /// Array elements whose predicate is truthy (`[?expr]`)
    Filter(Box<Ast>),
    /// Array elements with nested arrays spliced in one level (`[]`)
    Flatten,
}

impl Ast {
    pub fn subexpression(lhs: Ast, rhs: Ast) -> Ast {
        match lhs {
            Ast::Identity => rhs,
            lhs => Ast::Subexpression {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    pub fn projection(kind: ProjectionKind, lhs: Ast) -> Ast {
        Ast::Projection {
            kind,
            lhs: Box::new(lhs),
            rhs: Box::new(Ast::Identity),
        }
    }
}

/// `[start:stop:step]` with Python semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    /// Never zero; the parsers reject `[::0]`
    pub step: i64,
}

impl Slice {
    /// Indices selected from a sequence of `len` elements, in iteration order.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        let len = len as i64;
        let step = self.step;
        let (start, stop) = if step > 0 {
            let clamp = |i: i64| if i < 0 { (i + len).max(0) } else { i.min(len) };
            (self.start.map_or(0, clamp), self.stop.map_or(len, clamp))
        } else {
            let clamp = |i: i64| if i < 0 { (i + len).max(-1) } else { i.min(len - 1) };
            (self.start.map_or(len - 1, clamp), self.stop.map_or(-1, clamp))
        };

        let mut indices = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            indices.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
        indices
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{start}")?;
        }
        write!(f, ":")?;
        if let Some(stop) = self.stop {
            write!(f, "{stop}")?;
        }
        write!(f, ":{}", self.step)
    }
}

/// Resolves a possibly negative index against a sequence of `len` elements.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}
