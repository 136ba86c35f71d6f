//! Function registry and the built-in JMESPath functions.
//!
//! Functions are resolved by name while parsing, so an unknown name or a wrong
//! argument count for a fixed-arity function is a parse error. Argument types are
//! checked when the function runs; a mismatch is logged at `debug` level and the call
//! produces no value.

use std::{borrow::Cow, cmp::Ordering, collections::HashMap, fmt, sync::Arc};

use lazy_static::lazy_static;
use log::debug;
use serde_json::Value as Json;

use crate::{
    ast::Ast,
    error::Unmatched,
    evaluator::DynamicResources,
    value::{Array, Kind, Number, Object, Value},
};

/// A function callable from JMESPath expressions and JSONPath filters.
pub trait Function: Send + Sync {
    fn name(&self) -> &str;

    /// Required argument count, or `None` for variadic functions, which validate the
    /// count themselves.
    fn arity(&self) -> Option<usize>;

    fn evaluate<'a>(
        &self,
        args: &[Value<'a>],
        resources: &mut DynamicResources<'a>,
    ) -> Result<Value<'a>, Unmatched>;
}

impl fmt::Debug for dyn Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arity() {
            Some(arity) => write!(f, "{}/{}", self.name(), arity),
            None => write!(f, "{}/*", self.name()),
        }
    }
}

/// Name to function map consulted by the parsers.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

lazy_static! {
    static ref BUILTINS: FunctionRegistry = FunctionRegistry::with_builtins();
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh registry holding every built-in, ready for custom additions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in BUILTIN_TABLE {
            registry.register(*builtin);
        }
        registry
    }

    /// The shared built-in registry used by [`crate::Expression::compile`].
    pub fn builtins() -> &'static FunctionRegistry {
        &BUILTINS
    }

    /// Adds or replaces a function under its own name.
    pub fn register(&mut self, function: impl Function + 'static) {
        self.functions
            .insert(function.name().to_string(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

type Body = for<'a> fn(&[Value<'a>], &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched>;

#[derive(Clone, Copy)]
struct Builtin {
    name: &'static str,
    arity: Option<usize>,
    body: Body,
}

impl Function for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Option<usize> {
        self.arity
    }

    fn evaluate<'a>(
        &self,
        args: &[Value<'a>],
        resources: &mut DynamicResources<'a>,
    ) -> Result<Value<'a>, Unmatched> {
        if let Some(arity) = self.arity
            && args.len() != arity
        {
            debug!("{}(): expected {} argument(s), got {}", self.name, arity, args.len());
            return Err(Unmatched);
        }
        (self.body)(args, resources)
    }
}

const BUILTIN_TABLE: &[Builtin] = &[
    Builtin { name: "abs", arity: Some(1), body: abs },
    Builtin { name: "avg", arity: Some(1), body: avg },
    Builtin { name: "ceil", arity: Some(1), body: ceil },
    Builtin { name: "contains", arity: Some(2), body: contains },
    Builtin { name: "ends_with", arity: Some(2), body: ends_with },
    Builtin { name: "floor", arity: Some(1), body: floor },
    Builtin { name: "join", arity: Some(2), body: join },
    Builtin { name: "keys", arity: Some(1), body: keys },
    Builtin { name: "length", arity: Some(1), body: length },
    Builtin { name: "map", arity: Some(2), body: map },
    Builtin { name: "max", arity: Some(1), body: max },
    Builtin { name: "max_by", arity: Some(2), body: max_by },
    Builtin { name: "merge", arity: None, body: merge },
    Builtin { name: "min", arity: Some(1), body: min },
    Builtin { name: "min_by", arity: Some(2), body: min_by },
    Builtin { name: "not_null", arity: None, body: not_null },
    Builtin { name: "reverse", arity: Some(1), body: reverse },
    Builtin { name: "sort", arity: Some(1), body: sort },
    Builtin { name: "sort_by", arity: Some(2), body: sort_by },
    Builtin { name: "starts_with", arity: Some(2), body: starts_with },
    Builtin { name: "sum", arity: Some(1), body: sum },
    Builtin { name: "to_array", arity: Some(1), body: to_array },
    Builtin { name: "to_number", arity: Some(1), body: to_number },
    Builtin { name: "to_string", arity: Some(1), body: to_string },
    Builtin { name: "type", arity: Some(1), body: type_of },
    Builtin { name: "values", arity: Some(1), body: values },
];

fn mismatch(function: &str, expected: &str, found: &Value<'_>) -> Unmatched {
    debug!(
        "{function}(): expected {expected}, got {}",
        found.kind().type_name()
    );
    Unmatched
}

fn number_arg(function: &str, args: &[Value<'_>], index: usize) -> Result<Number, Unmatched> {
    args[index]
        .as_number()
        .ok_or_else(|| mismatch(function, "number", &args[index]))
}

fn string_arg<'v>(function: &str, args: &'v [Value<'_>], index: usize) -> Result<&'v str, Unmatched> {
    args[index]
        .as_str()
        .ok_or_else(|| mismatch(function, "string", &args[index]))
}

fn array_arg<'v, 'a>(
    function: &str,
    args: &'v [Value<'a>],
    index: usize,
) -> Result<&'v Array<'a>, Unmatched> {
    args[index]
        .as_array()
        .ok_or_else(|| mismatch(function, "array", &args[index]))
}

fn object_arg<'v, 'a>(
    function: &str,
    args: &'v [Value<'a>],
    index: usize,
) -> Result<&'v Object<'a>, Unmatched> {
    args[index]
        .as_object()
        .ok_or_else(|| mismatch(function, "object", &args[index]))
}

fn expression_arg<'a>(function: &str, args: &[Value<'a>], index: usize) -> Result<&'a Ast, Unmatched> {
    match &args[index] {
        Value::Expression(ast) => Ok(*ast),
        other => Err(mismatch(function, "expression", other)),
    }
}

fn numbers_arg(function: &str, args: &[Value<'_>], index: usize) -> Result<Vec<Number>, Unmatched> {
    let items = array_arg(function, args, index)?;
    let mut numbers = Vec::with_capacity(items.len());
    for item in items.iter() {
        match item.as_number() {
            Some(n) => numbers.push(n),
            None => return Err(mismatch(function, "array of numbers", &item)),
        }
    }
    Ok(numbers)
}

fn total(numbers: &[Number]) -> Option<Number> {
    numbers
        .iter()
        .try_fold(Number::from(0usize), |acc, n| acc.add(*n))
}

/// Numbers and strings sort; a list must hold only one of the two.
fn ensure_sortable(function: &str, values: &[Value<'_>]) -> Result<(), Unmatched> {
    let Some(first) = values.first() else {
        return Ok(());
    };
    let kind = first.kind();
    if !matches!(kind, Kind::Number | Kind::String) {
        return Err(mismatch(function, "numbers or strings", first));
    }
    match values.iter().find(|value| value.kind() != kind) {
        Some(other) => Err(mismatch(function, kind.type_name(), other)),
        None => Ok(()),
    }
}

fn sort_keys<'a>(
    function: &str,
    items: &[Value<'a>],
    expression: &'a Ast,
    resources: &mut DynamicResources<'a>,
) -> Result<Vec<Value<'a>>, Unmatched> {
    let keys = items
        .iter()
        .map(|item| resources.evaluate(expression, item))
        .collect::<Result<Vec<_>, _>>()?;
    ensure_sortable(function, &keys)?;
    Ok(keys)
}

fn ordering(a: &Value<'_>, b: &Value<'_>) -> Ordering {
    a.compare(b).unwrap_or(Ordering::Equal)
}

/// abs(number) - absolute value
fn abs<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    Ok(Value::Number(number_arg("abs", args, 0)?.abs()))
}

/// avg(array[number]) - mean, or null for an empty array
fn avg<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let numbers = numbers_arg("avg", args, 0)?;
    if numbers.is_empty() {
        return Ok(Value::Null);
    }
    total(&numbers)
        .and_then(|sum| sum.div(Number::from(numbers.len())))
        .map(Value::Number)
        .ok_or(Unmatched)
}

/// ceil(number)
fn ceil<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    Ok(Value::Number(number_arg("ceil", args, 0)?.ceil()))
}

/// contains(array|string, any) - membership by value equality, or substring
fn contains<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    match (&args[0], &args[1]) {
        (Value::Array(items), needle) => Ok(Value::Bool(items.iter().any(|item| &item == needle))),
        (Value::String(haystack), Value::String(needle)) => {
            Ok(Value::Bool(haystack.contains(needle.as_ref())))
        }
        (Value::String(_), _) => Ok(Value::Bool(false)),
        (other, _) => Err(mismatch("contains", "array or string", other)),
    }
}

/// ends_with(string, string)
fn ends_with<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let subject = string_arg("ends_with", args, 0)?;
    let suffix = string_arg("ends_with", args, 1)?;
    Ok(Value::Bool(subject.ends_with(suffix)))
}

/// floor(number)
fn floor<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    Ok(Value::Number(number_arg("floor", args, 0)?.floor()))
}

/// join(glue, array[string])
fn join<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let glue = string_arg("join", args, 0)?;
    let items = array_arg("join", args, 1)?;
    let mut parts: Vec<Cow<'a, str>> = Vec::with_capacity(items.len());
    for item in items.iter() {
        match item {
            Value::String(s) => parts.push(s),
            other => return Err(mismatch("join", "array of strings", &other)),
        }
    }
    Ok(Value::from(parts.join(glue)))
}

/// keys(object) - property names in document order
fn keys<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let entries = object_arg("keys", args, 0)?;
    Ok(Value::array(
        entries.iter().map(|(name, _)| Value::String(name)).collect(),
    ))
}

/// length(string|array|object) - code points for strings, element count otherwise
fn length<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    match &args[0] {
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(entries) => Ok(Value::from(entries.len())),
        other => Err(mismatch("length", "string, array or object", other)),
    }
}

/// map(&expr, array)
fn map<'a>(args: &[Value<'a>], resources: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let expression = expression_arg("map", args, 0)?;
    let items = array_arg("map", args, 1)?;
    let mut results = Vec::with_capacity(items.len());
    for item in items.iter() {
        results.push(resources.evaluate(expression, &item)?);
    }
    Ok(Value::array(results))
}

fn extremum<'a>(function: &str, args: &[Value<'a>], wanted: Ordering) -> Result<Value<'a>, Unmatched> {
    let items: Vec<Value<'a>> = array_arg(function, args, 0)?.iter().collect();
    ensure_sortable(function, &items)?;
    Ok(items
        .into_iter()
        .reduce(|best, item| {
            if ordering(&item, &best) == wanted {
                item
            } else {
                best
            }
        })
        .unwrap_or(Value::Null))
}

fn extremum_by<'a>(
    function: &str,
    args: &[Value<'a>],
    resources: &mut DynamicResources<'a>,
    wanted: Ordering,
) -> Result<Value<'a>, Unmatched> {
    let items: Vec<Value<'a>> = array_arg(function, args, 0)?.iter().collect();
    let expression = expression_arg(function, args, 1)?;
    let keys = sort_keys(function, &items, expression, resources)?;

    let mut best: Option<usize> = None;
    for i in 0..keys.len() {
        best = match best {
            Some(b) if ordering(&keys[i], &keys[b]) != wanted => Some(b),
            _ => Some(i),
        };
    }
    Ok(best.map_or(Value::Null, |i| items[i].clone()))
}

/// max(array[number]|array[string])
fn max<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    extremum("max", args, Ordering::Greater)
}

/// max_by(array, &expr)
fn max_by<'a>(args: &[Value<'a>], resources: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    extremum_by("max_by", args, resources, Ordering::Greater)
}

/// merge(object, ...) - later objects override earlier keys
fn merge<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    if args.is_empty() {
        debug!("merge(): expected at least one argument");
        return Err(Unmatched);
    }
    let mut merged: Vec<(Cow<'a, str>, Value<'a>)> = Vec::new();
    for arg in args {
        let Value::Object(entries) = arg else {
            return Err(mismatch("merge", "object", arg));
        };
        for (name, value) in entries.iter() {
            match merged.iter_mut().find(|(existing, _)| *existing == name) {
                Some(slot) => slot.1 = value,
                None => merged.push((name, value)),
            }
        }
    }
    Ok(Value::object(merged))
}

/// min(array[number]|array[string])
fn min<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    extremum("min", args, Ordering::Less)
}

/// min_by(array, &expr)
fn min_by<'a>(args: &[Value<'a>], resources: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    extremum_by("min_by", args, resources, Ordering::Less)
}

/// not_null(any, ...) - first non-null argument
fn not_null<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    if args.is_empty() {
        debug!("not_null(): expected at least one argument");
        return Err(Unmatched);
    }
    Ok(args
        .iter()
        .find(|arg| !arg.is_null())
        .cloned()
        .unwrap_or(Value::Null))
}

/// reverse(string|array)
fn reverse<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    match &args[0] {
        Value::String(s) => Ok(Value::from(s.chars().rev().collect::<String>())),
        Value::Array(items) => Ok(Value::array(items.iter().rev().collect())),
        other => Err(mismatch("reverse", "string or array", other)),
    }
}

/// sort(array[number]|array[string]) - stable
fn sort<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let mut items: Vec<Value<'a>> = array_arg("sort", args, 0)?.iter().collect();
    ensure_sortable("sort", &items)?;
    items.sort_by(ordering);
    Ok(Value::array(items))
}

/// sort_by(array, &expr) - stable
fn sort_by<'a>(args: &[Value<'a>], resources: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let items: Vec<Value<'a>> = array_arg("sort_by", args, 0)?.iter().collect();
    let expression = expression_arg("sort_by", args, 1)?;
    let keys = sort_keys("sort_by", &items, expression, resources)?;

    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| ordering(&keys[a], &keys[b]));
    Ok(Value::array(
        order.into_iter().map(|i| items[i].clone()).collect(),
    ))
}

/// starts_with(string, string)
fn starts_with<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let subject = string_arg("starts_with", args, 0)?;
    let prefix = string_arg("starts_with", args, 1)?;
    Ok(Value::Bool(subject.starts_with(prefix)))
}

/// sum(array[number]) - zero for an empty array
fn sum<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let numbers = numbers_arg("sum", args, 0)?;
    total(&numbers).map(Value::Number).ok_or(Unmatched)
}

/// to_array(any) - arrays unchanged, anything else wrapped
fn to_array<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    match &args[0] {
        Value::Array(_) => Ok(args[0].clone()),
        other => Ok(Value::array(vec![other.clone()])),
    }
}

/// to_number(any) - numbers unchanged, numeric strings parsed, null otherwise
fn to_number<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    match &args[0] {
        Value::Number(n) => Ok(Value::Number(*n)),
        Value::String(s) => match serde_json::from_str::<Json>(s) {
            Ok(Json::Number(n)) => Ok(Value::Number(Number::from_json(&n))),
            _ => Ok(Value::Null),
        },
        _ => Ok(Value::Null),
    }
}

/// to_string(any) - strings unchanged, anything else as compact JSON
fn to_string<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    match &args[0] {
        Value::String(_) => Ok(args[0].clone()),
        other => Ok(Value::from(other.to_json().to_string())),
    }
}

/// type(any)
fn type_of<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    Ok(Value::from(args[0].kind().type_name()))
}

/// values(object) - property values in document order
fn values<'a>(args: &[Value<'a>], _: &mut DynamicResources<'a>) -> Result<Value<'a>, Unmatched> {
    let entries = object_arg("values", args, 0)?;
    Ok(Value::array(entries.iter().map(|(_, value)| value).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_once() {
        let registry = FunctionRegistry::builtins();
        assert_eq!(registry.names().count(), BUILTIN_TABLE.len());
        for name in ["length", "sort_by", "not_null", "type", "merge"] {
            assert!(registry.contains(name), "{name} missing");
        }
        assert_eq!(registry.get("merge").unwrap().arity(), None);
        assert_eq!(registry.get("contains").unwrap().arity(), Some(2));
        assert!(registry.get("unique").is_none());
    }

    #[test]
    fn registry_debug_lists_sorted_names() {
        let mut registry = FunctionRegistry::new();
        registry.register(BUILTIN_TABLE[1]);
        registry.register(BUILTIN_TABLE[0]);
        assert_eq!(
            format!("{registry:?}"),
            r#"FunctionRegistry { functions: ["abs", "avg"] }"#
        );
    }
}
