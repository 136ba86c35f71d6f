use std::sync::Arc;

use serde_json::Value as Json;

use crate::{
    ast::{BinaryOperator, UnaryOperator},
    error::Unmatched,
    evaluator::DynamicResources,
    functions::Function,
    jsonpath::selector::{Selector, SelectorKind},
    value::Value,
};

/// Predicate inside `[?...]`.
#[derive(Debug, Clone)]
pub enum FilterExpr {
    /// Number, string, `true`, `false` or `null`
    Literal(Json),

    /// `@...` or `$...`. A singular path yields its single value, any other path the
    /// array of everything it matched.
    Path {
        selector: Box<Selector>,
        singular: bool,
    },

    Function {
        function: Arc<dyn Function>,
        args: Vec<FilterExpr>,
    },

    /// Comparisons with a missing operand match nothing, so `@.missing != 1` is false
    /// unlike RFC 9535; `&&` and `||` read a missing operand as null.
    Binary {
        op: BinaryOperator,
        lhs: Box<FilterExpr>,
        rhs: Box<FilterExpr>,
    },

    /// `!expr`, `-expr` or `expr =~ /re/`
    Unary {
        op: UnaryOperator,
        operand: Box<FilterExpr>,
    },
}

impl FilterExpr {
    /// Truthiness of the result; no value counts as false.
    pub fn test<'a>(&'a self, resources: &mut DynamicResources<'a>, current: &Value<'a>) -> bool {
        self.evaluate(resources, current)
            .is_ok_and(|value| value.is_truthy())
    }

    pub fn evaluate<'a>(
        &'a self,
        resources: &mut DynamicResources<'a>,
        current: &Value<'a>,
    ) -> Result<Value<'a>, Unmatched> {
        if !resources.tick() {
            return Err(Unmatched);
        }

        match self {
            FilterExpr::Literal(json) => Ok(Value::from_json(json)),

            FilterExpr::Path { selector, singular } => {
                let root_id = match selector.kind {
                    SelectorKind::Root { id } => Some(id),
                    _ => None,
                };
                if let Some(id) = root_id
                    && let Some(cached) = resources.cached_root(id)
                {
                    return Ok(cached);
                }

                let mut hits = Vec::new();
                selector.select(resources, &mut Vec::new(), current.clone(), &mut hits);
                let value = if *singular {
                    hits.into_iter().next().map(|node| node.value).ok_or(Unmatched)?
                } else {
                    Value::array(hits.into_iter().map(|node| node.value).collect())
                };

                if let Some(id) = root_id {
                    resources.cache_root(id, value.clone());
                }
                Ok(value)
            }

            FilterExpr::Function { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(resources, current)?);
                }
                function.evaluate(&values, resources)
            }

            FilterExpr::Binary { op, lhs, rhs } => {
                if matches!(op, BinaryOperator::And | BinaryOperator::Or) {
                    let left = lhs.evaluate(resources, current).unwrap_or(Value::Null);
                    if let Some(result) = op.short_circuit(&left) {
                        return Ok(result);
                    }
                    let right = rhs.evaluate(resources, current).unwrap_or(Value::Null);
                    return op.evaluate(left, right);
                }
                let left = lhs.evaluate(resources, current)?;
                let right = rhs.evaluate(resources, current)?;
                op.evaluate(left, right)
            }

            FilterExpr::Unary {
                op: UnaryOperator::Not,
                operand,
            } => Ok(Value::Bool(!operand.test(resources, current))),

            FilterExpr::Unary { op, operand } => op.evaluate(operand.evaluate(resources, current)?),
        }
    }
}
