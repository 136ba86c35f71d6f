use regex::Regex;

use crate::{
    error::Unmatched,
    value::{Number, Value},
};

/// Binding strength; lower levels bind tighter.
///
/// Relative order: unary < arithmetic < relational < equality < `&&` < `||` <
/// projection < `|` < `&expr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    /// Operands and group markers
    Primary = 0,
    Unary = 1,
    Multiplicative = 2,
    Additive = 3,
    Relational = 4,
    Equality = 5,
    And = 6,
    Or = 7,
    Projection = 8,
    Pipe = 9,
    ExpressionType = 10,
}

/// Whether a pending operator must be reduced before `incoming` is pushed.
///
/// The pending operator yields when it binds strictly tighter, or equally tight and
/// `incoming` groups left to right. Right-associative operators only cede to strictly
/// tighter ones.
pub fn yields_to(pending: Precedence, incoming: Precedence, incoming_right_associative: bool) -> bool {
    pending < incoming || (pending == incoming && !incoming_right_associative)
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    /// `||`
    Or,
    /// `&&`
    And,

    // Comparison
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterEqual,

    // Arithmetic
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `//`
    IntegerDivide,
}

impl BinaryOperator {
    pub fn precedence(self) -> Precedence {
        use BinaryOperator::*;
        match self {
            Or => Precedence::Or,
            And => Precedence::And,
            Equal | NotEqual => Precedence::Equality,
            LessThan | LessEqual | GreaterThan | GreaterEqual => Precedence::Relational,
            Add | Subtract => Precedence::Additive,
            Multiply | Divide | Modulo | IntegerDivide => Precedence::Multiplicative,
        }
    }

    pub fn is_right_associative(self) -> bool {
        false
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Or => "||",
            And => "&&",
            Equal => "==",
            NotEqual => "!=",
            LessThan => "<",
            LessEqual => "<=",
            GreaterThan => ">",
            GreaterEqual => ">=",
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Modulo => "%",
            IntegerDivide => "//",
        }
    }

    /// The result decided by the left operand alone, if any.
    pub fn short_circuit<'a>(self, lhs: &Value<'a>) -> Option<Value<'a>> {
        match self {
            BinaryOperator::Or if lhs.is_truthy() => Some(lhs.clone()),
            BinaryOperator::And if !lhs.is_truthy() => Some(lhs.clone()),
            _ => None,
        }
    }

    pub fn evaluate<'a>(self, lhs: Value<'a>, rhs: Value<'a>) -> Result<Value<'a>, Unmatched> {
        use BinaryOperator::*;
        use std::cmp::Ordering::{Greater, Less};

        let arithmetic = |op: fn(Number, Number) -> Option<Number>| match (&lhs, &rhs) {
            (Value::Number(a), Value::Number(b)) => op(*a, *b).map(Value::Number).ok_or(Unmatched),
            _ => Err(Unmatched),
        };

        match self {
            Or => Ok(if lhs.is_truthy() { lhs } else { rhs }),
            And => Ok(if lhs.is_truthy() { rhs } else { lhs }),
            Equal => Ok(Value::Bool(lhs == rhs)),
            NotEqual => Ok(Value::Bool(lhs != rhs)),
            LessThan | LessEqual | GreaterThan | GreaterEqual => {
                let Some(ordering) = lhs.compare(&rhs) else {
                    return Ok(Value::Null);
                };
                Ok(Value::Bool(match self {
                    LessThan => ordering == Less,
                    LessEqual => ordering != Greater,
                    GreaterThan => ordering == Greater,
                    _ => ordering != Less,
                }))
            }
            Add => arithmetic(Number::add),
            Subtract => arithmetic(Number::sub),
            Multiply => arithmetic(Number::mul),
            Divide => arithmetic(Number::div),
            Modulo => arithmetic(Number::rem),
            IntegerDivide => arithmetic(Number::div_floor),
        }
    }
}

/// Prefix and postfix operators on a single operand.
#[derive(Debug, Clone)]
pub enum UnaryOperator {
    /// `!expr`
    Not,

    /// `-expr`
    Minus,

    /// `expr =~ /pattern/flags`, only produced by JSONPath filters
    Matches(Regex),
}

impl UnaryOperator {
    pub fn precedence(&self) -> Precedence {
        Precedence::Unary
    }

    pub fn is_right_associative(&self) -> bool {
        true
    }

    pub fn evaluate<'a>(&self, operand: Value<'a>) -> Result<Value<'a>, Unmatched> {
        match self {
            UnaryOperator::Not => Ok(Value::Bool(!operand.is_truthy())),
            UnaryOperator::Minus => match operand {
                Value::Number(n) => Ok(Value::Number(n.neg())),
                _ => Err(Unmatched),
            },
            UnaryOperator::Matches(regex) => match operand.as_str() {
                Some(s) => Ok(Value::Bool(regex.is_match(s))),
                None => Err(Unmatched),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(doc: &serde_json::Value) -> Vec<Value<'_>> {
        doc.as_array().unwrap().iter().map(Value::from_json).collect()
    }

    #[test]
    fn or_and_return_operands() {
        let doc = json!([null, "a", [], 0]);
        let v = values(&doc);
        assert_eq!(BinaryOperator::Or.evaluate(v[0].clone(), v[1].clone()), Ok(v[1].clone()));
        assert_eq!(BinaryOperator::Or.evaluate(v[0].clone(), v[0].clone()), Ok(Value::Null));
        assert_eq!(BinaryOperator::And.evaluate(v[2].clone(), v[1].clone()), Ok(v[2].clone()));
        assert_eq!(BinaryOperator::And.evaluate(v[3].clone(), v[1].clone()), Ok(v[1].clone()));
        assert!(BinaryOperator::Or.short_circuit(&v[1]).is_some());
        assert!(BinaryOperator::And.short_circuit(&v[1]).is_none());
    }

    #[test]
    fn ordering_needs_matching_kinds() {
        let doc = json!([1, 2.5, "a", "b", true]);
        let v = values(&doc);
        fn lt<'a>(a: &Value<'a>, b: &Value<'a>) -> Result<Value<'a>, Unmatched> {
            BinaryOperator::LessThan.evaluate(a.clone(), b.clone())
        }
        assert_eq!(lt(&v[0], &v[1]), Ok(Value::Bool(true)));
        assert_eq!(lt(&v[2], &v[3]), Ok(Value::Bool(true)));
        assert_eq!(lt(&v[0], &v[2]), Ok(Value::Null));
        assert_eq!(lt(&v[4], &v[4]), Ok(Value::Null));
        assert_eq!(
            BinaryOperator::GreaterEqual.evaluate(v[1].clone(), v[1].clone()),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn each_comparator_keeps_its_meaning() {
        let doc = json!([2, 2, 3]);
        let v = values(&doc);
        fn cmp<'a>(op: BinaryOperator, a: &Value<'a>, b: &Value<'a>) -> Result<Value<'a>, Unmatched> {
            op.evaluate(a.clone(), b.clone())
        }

        assert_eq!(cmp(BinaryOperator::Equal, &v[0], &v[1]), Ok(Value::Bool(true)));
        assert_eq!(cmp(BinaryOperator::NotEqual, &v[0], &v[1]), Ok(Value::Bool(false)));
        assert_eq!(cmp(BinaryOperator::GreaterThan, &v[0], &v[1]), Ok(Value::Bool(false)));
        assert_eq!(cmp(BinaryOperator::LessThan, &v[0], &v[1]), Ok(Value::Bool(false)));
        assert_eq!(cmp(BinaryOperator::LessEqual, &v[0], &v[1]), Ok(Value::Bool(true)));
        assert_eq!(cmp(BinaryOperator::NotEqual, &v[0], &v[2]), Ok(Value::Bool(true)));
        assert_eq!(cmp(BinaryOperator::GreaterThan, &v[2], &v[0]), Ok(Value::Bool(true)));
        assert_eq!(cmp(BinaryOperator::Add, &v[0], &v[2]).map(|n| n.to_json()), Ok(json!(5)));
    }

    #[test]
    fn arithmetic_rejects_non_numbers() {
        let doc = json!(["abc", 1, 0]);
        let v = values(&doc);
        assert_eq!(BinaryOperator::Add.evaluate(v[0].clone(), v[1].clone()), Err(Unmatched));
        assert_eq!(BinaryOperator::Divide.evaluate(v[1].clone(), v[2].clone()), Err(Unmatched));
        assert_eq!(
            BinaryOperator::Subtract.evaluate(v[1].clone(), v[1].clone()),
            Ok(Value::from(0usize))
        );
    }

    #[test]
    fn unary_operators() {
        let doc = json!(["abc", 3, []]);
        let v = values(&doc);
        assert_eq!(UnaryOperator::Not.evaluate(v[2].clone()), Ok(Value::Bool(true)));
        assert_eq!(UnaryOperator::Minus.evaluate(v[0].clone()), Err(Unmatched));
        assert_eq!(
            UnaryOperator::Minus.evaluate(v[1].clone()).map(|n| n.to_json()),
            Ok(json!(-3))
        );
        let matches = UnaryOperator::Matches(Regex::new("^a").unwrap());
        assert_eq!(matches.evaluate(v[0].clone()), Ok(Value::Bool(true)));
        assert_eq!(matches.evaluate(v[1].clone()), Err(Unmatched));
    }

    #[test]
    fn precedence_yields() {
        assert!(yields_to(Precedence::Multiplicative, Precedence::Additive, false));
        assert!(yields_to(Precedence::Additive, Precedence::Additive, false));
        assert!(!yields_to(Precedence::Unary, Precedence::Unary, true));
        assert!(!yields_to(Precedence::Or, Precedence::And, false));
        assert!(yields_to(Precedence::Or, Precedence::Pipe, false));
    }
}
