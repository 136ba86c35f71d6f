use std::{
    borrow::Cow,
    cmp::Ordering,
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    slice,
};

use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use serde_json::{Map, Value as Json};

use crate::ast::Ast;

/// How deep [`Value`] hashing descends before it stops looking at children.
pub const MAX_HASH_DEPTH: usize = 64;

/// The dynamic type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    True,
    False,
    Number,
    String,
    Array,
    Object,
    Expression,
}

impl Kind {
    /// The name reported by the `type()` function.
    pub fn type_name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::True | Kind::False => "boolean",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Expression => "expref",
        }
    }
}

/// A number with two representations.
///
/// Arithmetic and comparisons always try the exact decimal form of both operands first
/// and fall back to `f64` when either operand has no decimal form or the decimal
/// operation overflows. Integers read from a document start out as decimals.
///
/// # Examples
///
/// ```
/// use quarry::value::Number;
///
/// let sum = Number::from(0.1).add(Number::from(0.2)).unwrap();
/// assert_eq!(sum.to_json(), serde_json::json!(0.3));
/// ```
#[derive(Debug, Clone, Copy)]
pub enum Number {
    /// Exact decimal with 96-bit mantissa
    Decimal(Decimal),

    /// Binary floating point, used when the decimal form is unavailable
    Float(f64),
}

impl Number {
    pub fn from_json(number: &serde_json::Number) -> Self {
        if let Some(n) = number.as_i64() {
            Number::Decimal(Decimal::from(n))
        } else if let Some(n) = number.as_u64() {
            Number::Decimal(Decimal::from(n))
        } else {
            Number::Float(number.as_f64().unwrap_or(f64::NAN))
        }
    }

    pub fn try_decimal(self) -> Option<Decimal> {
        match self {
            Number::Decimal(d) => Some(d),
            Number::Float(f) => Decimal::from_f64(f),
        }
    }

    pub fn try_f64(self) -> Option<f64> {
        match self {
            Number::Decimal(d) => d.to_f64(),
            Number::Float(f) => f.is_finite().then_some(f),
        }
    }

    fn combine(
        self,
        other: Number,
        exact: fn(Decimal, Decimal) -> Option<Decimal>,
        inexact: fn(f64, f64) -> f64,
    ) -> Option<Number> {
        if let (Some(a), Some(b)) = (self.try_decimal(), other.try_decimal())
            && let Some(result) = exact(a, b)
        {
            return Some(Number::Decimal(result));
        }
        let result = inexact(self.try_f64()?, other.try_f64()?);
        result.is_finite().then_some(Number::Float(result))
    }

    fn map(self, exact: fn(Decimal) -> Decimal, inexact: fn(f64) -> f64) -> Number {
        match self.try_decimal() {
            Some(d) => Number::Decimal(exact(d)),
            None => match self {
                Number::Float(f) => Number::Float(inexact(f)),
                decimal => decimal,
            },
        }
    }

    pub fn add(self, other: Number) -> Option<Number> {
        self.combine(other, Decimal::checked_add, |a, b| a + b)
    }

    pub fn sub(self, other: Number) -> Option<Number> {
        self.combine(other, Decimal::checked_sub, |a, b| a - b)
    }

    pub fn mul(self, other: Number) -> Option<Number> {
        self.combine(other, Decimal::checked_mul, |a, b| a * b)
    }

    /// Division by zero produces no result.
    pub fn div(self, other: Number) -> Option<Number> {
        self.combine(other, Decimal::checked_div, |a, b| a / b)
    }

    pub fn rem(self, other: Number) -> Option<Number> {
        self.combine(other, Decimal::checked_rem, |a, b| a % b)
    }

    /// Division rounded towards negative infinity.
    pub fn div_floor(self, other: Number) -> Option<Number> {
        self.combine(
            other,
            |a, b| a.checked_div(b).map(|q| q.floor()),
            |a, b| (a / b).floor(),
        )
    }

    pub fn neg(self) -> Number {
        self.map(|d| -d, |f| -f)
    }

    pub fn abs(self) -> Number {
        self.map(|d| d.abs(), f64::abs)
    }

    pub fn ceil(self) -> Number {
        self.map(|d| d.ceil(), f64::ceil)
    }

    pub fn floor(self) -> Number {
        self.map(|d| d.floor(), f64::floor)
    }

    pub fn compare(self, other: Number) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.try_decimal(), other.try_decimal()) {
            return Some(a.cmp(&b));
        }
        self.try_f64()?.partial_cmp(&other.try_f64()?)
    }

    pub fn is_integer(self) -> bool {
        match self {
            Number::Decimal(d) => d.fract().is_zero(),
            Number::Float(f) => f.is_finite() && f.fract() == 0.0,
        }
    }

    /// Converts back to a JSON number; whole decimals become JSON integers.
    pub fn to_json(self) -> Json {
        match self {
            Number::Decimal(d) => {
                let d = d.normalize();
                if d.scale() == 0 {
                    if let Some(n) = d.to_i64() {
                        return Json::from(n);
                    }
                    if let Some(n) = d.to_u64() {
                        return Json::from(n);
                    }
                }
                d.to_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Json::Null, Json::Number)
            }
            Number::Float(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
        }
    }

    fn hash_into<H: Hasher>(self, state: &mut H) {
        match self.try_decimal() {
            Some(d) => d.normalize().hash(state),
            None => self.try_f64().map(f64::to_bits).hash(state),
        }
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::Decimal(Decimal::from(n))
    }
}

impl From<usize> for Number {
    fn from(n: usize) -> Self {
        Number::Decimal(Decimal::from(n))
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

impl From<Decimal> for Number {
    fn from(d: Decimal) -> Self {
        Number::Decimal(d)
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.compare(*other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// A value seen during evaluation.
///
/// Arrays, objects and strings taken from the input document are borrowed views;
/// values computed during evaluation (projection results, function results) are owned.
/// Both read the same way.
#[derive(Debug, Clone)]
pub enum Value<'a> {
    Null,

    Bool(bool),

    Number(Number),

    String(Cow<'a, str>),

    Array(Array<'a>),

    Object(Object<'a>),

    /// An `&expr` reference, passed to functions like `sort_by`
    Expression(&'a Ast),
}

impl<'a> Value<'a> {
    /// Views a document node without copying it.
    pub fn from_json(json: &'a Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(Number::from_json(n)),
            Json::String(s) => Value::String(Cow::Borrowed(s.as_str())),
            Json::Array(items) => Value::Array(Array::View(items.as_slice())),
            Json::Object(map) => Value::Object(Object::View(map)),
        }
    }

    pub fn array(items: Vec<Value<'a>>) -> Self {
        Value::Array(Array::Owned(items))
    }

    pub fn object(entries: Vec<(Cow<'a, str>, Value<'a>)>) -> Self {
        Value::Object(Object::Owned(entries))
    }

    pub fn string(s: impl Into<Cow<'a, str>>) -> Self {
        Value::String(s.into())
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Bool(true) => Kind::True,
            Value::Bool(false) => Kind::False,
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Object,
            Value::Expression(_) => Kind::Expression,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// False, null, and empty strings, arrays and objects are false. Numbers are
    /// always true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(_) | Value::Expression(_) => true,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(entries) => !entries.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn try_decimal(&self) -> Option<Decimal> {
        self.as_number()?.try_decimal()
    }

    pub fn try_f64(&self) -> Option<f64> {
        self.as_number()?.try_f64()
    }

    pub fn as_array(&self) -> Option<&Array<'a>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object<'a>> {
        match self {
            Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Property lookup; `None` when missing or when this is not an object.
    pub fn get(&self, name: &str) -> Option<Value<'a>> {
        self.as_object()?.get(name)
    }

    /// Element lookup; `None` when out of range or when this is not an array.
    pub fn index(&self, index: usize) -> Option<Value<'a>> {
        self.as_array()?.get(index)
    }

    /// Element count of an array or object.
    ///
    /// Calling this on any other kind is a bug in the caller.
    pub fn len(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            Value::Object(entries) => entries.len(),
            other => {
                debug_assert!(false, "len() called on {}", other.kind().type_name());
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sort order used by `sort`, `max` and friends: numbers numerically, strings by
    /// UTF-16 code unit. Any other pairing has no order.
    pub fn compare(&self, other: &Value<'_>) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.compare(*b),
            (Value::String(a), Value::String(b)) => Some(a.encode_utf16().cmp(b.encode_utf16())),
            _ => None,
        }
    }

    /// Deep copy into an owned JSON document.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null | Value::Expression(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => n.to_json(),
            Value::String(s) => Json::String(s.to_string()),
            Value::Array(Array::View(items)) => Json::Array(items.to_vec()),
            Value::Array(Array::Owned(items)) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(Object::View(map)) => Json::Object((*map).clone()),
            Value::Object(Object::Owned(entries)) => {
                let mut map = Map::with_capacity(entries.len());
                for (name, value) in entries {
                    map.insert(name.to_string(), value.to_json());
                }
                Json::Object(map)
            }
        }
    }

    /// Hash with an explicit recursion cap; children below `depth` levels are ignored.
    pub fn hash_with_depth<H: Hasher>(&self, state: &mut H, depth: usize) {
        self.kind().hash(state);
        if depth == 0 {
            return;
        }
        match self {
            Value::Number(n) => n.hash_into(state),
            Value::String(s) => s.hash(state),
            Value::Array(items) => {
                items.len().hash(state);
                for item in items.iter() {
                    item.hash_with_depth(state, depth - 1);
                }
            }
            Value::Object(entries) => {
                entries.len().hash(state);
                for (name, value) in entries.sorted_entries() {
                    name.hash(state);
                    value.hash_with_depth(state, depth - 1);
                }
            }
            Value::Expression(ast) => std::ptr::hash(*ast, state),
            Value::Null | Value::Bool(_) => {}
        }
    }

    /// Convenience hash used by uniqueness checks.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a
                        .sorted_entries()
                        .iter()
                        .zip(b.sorted_entries().iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
            }
            (Value::Expression(a), Value::Expression(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl Eq for Value<'_> {}

impl Hash for Value<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_with_depth(state, MAX_HASH_DEPTH);
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Number> for Value<'_> {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<usize> for Value<'_> {
    fn from(n: usize) -> Self {
        Value::Number(Number::from(n))
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Value::String(Cow::Borrowed(s))
    }
}

impl From<String> for Value<'_> {
    fn from(s: String) -> Self {
        Value::String(Cow::Owned(s))
    }
}

/// Array payload: a view over document elements or an owned list.
#[derive(Debug, Clone)]
pub enum Array<'a> {
    View(&'a [Json]),
    Owned(Vec<Value<'a>>),
}

impl<'a> Array<'a> {
    pub fn len(&self) -> usize {
        match self {
            Array::View(items) => items.len(),
            Array::Owned(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value<'a>> {
        match self {
            Array::View(items) => items.get(index).map(Value::from_json),
            Array::Owned(items) => items.get(index).cloned(),
        }
    }

    pub fn iter(&self) -> ArrayIter<'a, '_> {
        match self {
            Array::View(items) => ArrayIter::View(items.iter()),
            Array::Owned(items) => ArrayIter::Owned(items.iter()),
        }
    }
}

pub enum ArrayIter<'a, 'b> {
    View(slice::Iter<'a, Json>),
    Owned(slice::Iter<'b, Value<'a>>),
}

impl<'a> Iterator for ArrayIter<'a, '_> {
    type Item = Value<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ArrayIter::View(items) => items.next().map(Value::from_json),
            ArrayIter::Owned(items) => items.next().cloned(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            ArrayIter::View(items) => items.size_hint(),
            ArrayIter::Owned(items) => items.size_hint(),
        }
    }
}

impl DoubleEndedIterator for ArrayIter<'_, '_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        match self {
            ArrayIter::View(items) => items.next_back().map(Value::from_json),
            ArrayIter::Owned(items) => items.next_back().cloned(),
        }
    }
}

impl ExactSizeIterator for ArrayIter<'_, '_> {}

/// Object payload: a view over a document map or an owned entry list.
///
/// Owned objects keep entries in insertion order and may repeat a name; lookup returns
/// the first match.
#[derive(Debug, Clone)]
pub enum Object<'a> {
    View(&'a Map<String, Json>),
    Owned(Vec<(Cow<'a, str>, Value<'a>)>),
}

impl<'a> Object<'a> {
    pub fn len(&self) -> usize {
        match self {
            Object::View(map) => map.len(),
            Object::Owned(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<Value<'a>> {
        match self {
            Object::View(map) => map.get(name).map(Value::from_json),
            Object::Owned(entries) => entries
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone()),
        }
    }

    pub fn iter(&self) -> ObjectIter<'a, '_> {
        match self {
            Object::View(map) => ObjectIter::View(map.iter()),
            Object::Owned(entries) => ObjectIter::Owned(entries.iter()),
        }
    }

    /// Entries ordered by name; equal names keep their relative order.
    fn sorted_entries(&self) -> Vec<(Cow<'a, str>, Value<'a>)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

pub enum ObjectIter<'a, 'b> {
    View(serde_json::map::Iter<'a>),
    Owned(slice::Iter<'b, (Cow<'a, str>, Value<'a>)>),
}

impl<'a> Iterator for ObjectIter<'a, '_> {
    type Item = (Cow<'a, str>, Value<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ObjectIter::View(entries) => entries
                .next()
                .map(|(name, value)| (Cow::Borrowed(name.as_str()), Value::from_json(value))),
            ObjectIter::Owned(entries) => entries.next().cloned(),
        }
    }
}
