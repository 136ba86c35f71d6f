use std::{collections::HashMap, env, fmt, str::FromStr};

use log::{trace, warn};
use serde_json::Value as Json;

use crate::{
    ast::{normalize_index, Ast, ProjectionKind},
    error::{EvalError, ParseError, Unmatched},
    functions::FunctionRegistry,
    parser::Parser,
    value::{Array, Value},
};

/// Default cap on recursive descent and schema validation depth.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Per-evaluation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Deepest nesting visited by recursive descent and schema validation
    pub max_depth: usize,
    /// Node and selector evaluations allowed before the search is aborted
    pub step_budget: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_depth: DEFAULT_MAX_DEPTH,
            step_budget: None,
        }
    }
}

impl Options {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_step_budget(mut self, step_budget: usize) -> Self {
        self.step_budget = Some(step_budget);
        self
    }

    /// Defaults overridden by `QUARRY_MAX_DEPTH` and `QUARRY_STEP_BUDGET`.
    ///
    /// Malformed values are logged and ignored.
    pub fn from_env() -> Self {
        let mut options = Options::default();
        if let Some(max_depth) = env_setting("QUARRY_MAX_DEPTH") {
            options.max_depth = max_depth;
        }
        if let Some(step_budget) = env_setting("QUARRY_STEP_BUDGET") {
            options.step_budget = Some(step_budget);
        }
        options
    }
}

fn env_setting(name: &str) -> Option<usize> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring {name}={raw:?}: expected a non-negative integer");
            None
        }
    }
}

/// State owned by a single evaluation.
///
/// Created fresh for every search, so compiled expressions stay immutable and can be
/// shared across threads. Functions receive it to evaluate `&expr` arguments.
pub struct DynamicResources<'a> {
    root: Value<'a>,
    options: Options,
    steps: usize,
    exhausted: bool,
    root_cache: HashMap<usize, Value<'a>>,
}

impl<'a> DynamicResources<'a> {
    pub fn new(document: &'a Json, options: Options) -> Self {
        DynamicResources {
            root: Value::from_json(document),
            options,
            steps: 0,
            exhausted: false,
            root_cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> Value<'a> {
        self.root.clone()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn max_depth(&self) -> usize {
        self.options.max_depth
    }

    /// Counts one evaluation step. Returns `false` once the step budget is spent.
    pub fn tick(&mut self) -> bool {
        self.steps += 1;
        if let Some(budget) = self.options.step_budget
            && self.steps > budget
        {
            self.exhausted = true;
        }
        !self.exhausted
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Memoized result of a root-relative path, keyed by the id assigned when parsing.
    pub fn cached_root(&self, id: usize) -> Option<Value<'a>> {
        self.root_cache.get(&id).cloned()
    }

    pub fn cache_root(&mut self, id: usize, value: Value<'a>) {
        self.root_cache.insert(id, value);
    }

    /// Evaluates `ast` against `current`; used by functions taking `&expr` arguments.
    pub fn evaluate(&mut self, ast: &'a Ast, current: &Value<'a>) -> Result<Value<'a>, Unmatched> {
        interpret(ast, current, self)
    }
}

/// Walks `ast` against `current`.
pub fn interpret<'a>(
    ast: &'a Ast,
    current: &Value<'a>,
    resources: &mut DynamicResources<'a>,
) -> Result<Value<'a>, Unmatched> {
    if !resources.tick() {
        return Err(Unmatched);
    }

    match ast {
        Ast::Identity => Ok(current.clone()),

        Ast::Field(name) => Ok(current.get(name).unwrap_or(Value::Null)),

        Ast::Index(index) => Ok(current
            .as_array()
            .and_then(|items| normalize_index(*index, items.len()).and_then(|i| items.get(i)))
            .unwrap_or(Value::Null)),

        Ast::Slice(slice) => Ok(match current.as_array() {
            Some(items) => Value::array(
                slice
                    .indices(items.len())
                    .into_iter()
                    .filter_map(|i| items.get(i))
                    .collect(),
            ),
            None => Value::Null,
        }),

        Ast::Literal(json) => Ok(Value::from_json(json)),

        Ast::Subexpression { lhs, rhs } => {
            let base = interpret(lhs, current, resources)?;
            interpret(rhs, &base, resources)
        }

        Ast::Projection { kind, lhs, rhs } => {
            let base = interpret(lhs, current, resources)?;
            let Some(elements) = projected(kind, &base, resources) else {
                return Ok(Value::Null);
            };
            let mut results = Vec::with_capacity(elements.len());
            for element in &elements {
                match interpret(rhs, element, resources) {
                    Ok(Value::Null) | Err(Unmatched) => {}
                    Ok(value) => results.push(value),
                }
            }
            Ok(Value::array(results))
        }

        Ast::MultiSelectList(items) => {
            if current.is_null() {
                return Ok(Value::Null);
            }
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                results.push(interpret(item, current, resources).unwrap_or(Value::Null));
            }
            Ok(Value::array(results))
        }

        Ast::MultiSelectHash(entries) => {
            if current.is_null() {
                return Ok(Value::Null);
            }
            let mut results = Vec::with_capacity(entries.len());
            for (key, item) in entries {
                let value = interpret(item, current, resources).unwrap_or(Value::Null);
                results.push((key.as_str().into(), value));
            }
            Ok(Value::object(results))
        }

        Ast::Binary { op, lhs, rhs } => {
            let left = interpret(lhs, current, resources)?;
            if let Some(result) = op.short_circuit(&left) {
                return Ok(result);
            }
            let right = interpret(rhs, current, resources)?;
            op.evaluate(left, right)
        }

        Ast::Unary { op, operand } => op.evaluate(interpret(operand, current, resources)?),

        Ast::Pipe { lhs, rhs } => {
            let base = interpret(lhs, current, resources).unwrap_or(Value::Null);
            interpret(rhs, &base, resources)
        }

        Ast::Function { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(interpret(arg, current, resources)?);
            }
            function.evaluate(&values, resources)
        }

        Ast::ExpressionRef(inner) => Ok(Value::Expression(inner.as_ref())),
    }
}

/// The elements a projection iterates over, or `None` when `base` has the wrong shape.
fn projected<'a>(
    kind: &'a ProjectionKind,
    base: &Value<'a>,
    resources: &mut DynamicResources<'a>,
) -> Option<Vec<Value<'a>>> {
    match kind {
        ProjectionKind::List => Some(base.as_array()?.iter().collect()),
        ProjectionKind::Object => Some(base.as_object()?.iter().map(|(_, value)| value).collect()),
        ProjectionKind::Flatten => Some(flatten(base.as_array()?)),
        ProjectionKind::Filter(predicate) => {
            let items = base.as_array()?;
            let mut kept = Vec::new();
            for item in items.iter() {
                if interpret(predicate, &item, resources).is_ok_and(|keep| keep.is_truthy()) {
                    kept.push(item);
                }
            }
            Some(kept)
        }
    }
}

fn flatten<'a>(items: &Array<'a>) -> Vec<Value<'a>> {
    let mut flat = Vec::with_capacity(items.len());
    for item in items.iter() {
        match item {
            Value::Array(inner) => flat.extend(inner.iter()),
            other => flat.push(other),
        }
    }
    flat
}

/// A compiled JMESPath expression.
///
/// Compile once and search any number of documents, from any number of threads.
///
/// # Examples
///
/// ```
/// use quarry::Expression;
/// use serde_json::json;
///
/// let expr = Expression::compile("people[?age > `20`].name").unwrap();
/// let doc = json!({"people": [{"name": "George", "age": 30}, {"name": "Ann", "age": 19}]});
/// assert_eq!(expr.search(&doc), json!(["George"]));
/// ```
#[derive(Debug, Clone)]
pub struct Expression {
    ast: Ast,
    source: String,
}

impl Expression {
    /// Compiles `text` against the built-in function registry.
    pub fn compile(text: &str) -> Result<Self, ParseError> {
        Self::compile_with(text, FunctionRegistry::builtins())
    }

    /// Compiles `text`, resolving function names in `registry`.
    pub fn compile_with(text: &str, registry: &FunctionRegistry) -> Result<Self, ParseError> {
        let ast = Parser::new(text, registry).parse()?;
        Ok(Expression {
            ast,
            source: text.to_string(),
        })
    }

    /// Evaluates against `document`. Type mismatches produce `null`.
    pub fn search(&self, document: &Json) -> Json {
        self.search_with(document, &Options::default())
            .unwrap_or(Json::Null)
    }

    /// Alias of [`Expression::search`].
    pub fn transform(&self, document: &Json) -> Json {
        self.search(document)
    }

    /// Evaluates with explicit limits.
    ///
    /// # Errors
    ///
    /// [`EvalError::BudgetExhausted`] when the step budget runs out before the
    /// evaluation finishes.
    pub fn search_with(&self, document: &Json, options: &Options) -> Result<Json, EvalError> {
        trace!("searching with {:?}", self.source);
        let mut resources = DynamicResources::new(document, *options);
        let root = resources.root();
        let result = interpret(&self.ast, &root, &mut resources);
        if resources.is_exhausted() {
            return Err(EvalError::BudgetExhausted(
                options.step_budget.unwrap_or_default(),
            ));
        }
        Ok(result.map_or(Json::Null, |value| value.to_json()))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Expression {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Expression::compile(text)
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Expression {}

/// Compiles and evaluates `text` in one call.
pub fn transform(document: &Json, text: &str) -> Result<Json, ParseError> {
    Ok(Expression::compile(text)?.search(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn budget_aborts_evaluation() {
        let expr = Expression::compile("a[*].b[*].c").unwrap();
        let doc = json!({"a": [{"b": [{"c": 1}, {"c": 2}]}, {"b": [{"c": 3}]}]});
        assert_eq!(
            expr.search_with(&doc, &Options::default().with_step_budget(3)),
            Err(EvalError::BudgetExhausted(3))
        );
        assert_eq!(
            expr.search_with(&doc, &Options::default().with_step_budget(1_000)),
            Ok(json!([[1, 2], [3]]))
        );
    }

    #[test]
    fn steps_are_counted_per_node() {
        let doc = json!({"a": {"b": 1}});
        let expr = Expression::compile("a.b").unwrap();
        let mut resources = DynamicResources::new(&doc, Options::default());
        let root = resources.root();
        let result = interpret(expr.ast(), &root, &mut resources).unwrap();
        assert_eq!(result.to_json(), json!(1));
        // subexpression, a, b
        assert_eq!(resources.steps(), 3);
    }

    #[test]
    fn options_builders() {
        let options = Options::default().with_max_depth(5).with_step_budget(10);
        assert_eq!(options.max_depth, 5);
        assert_eq!(options.step_budget, Some(10));
        assert_eq!(Options::default().max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn expressions_compare_by_source() {
        let a: Expression = "foo.bar".parse().unwrap();
        let b = Expression::compile("foo.bar").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "foo.bar");
        assert_ne!(a, Expression::compile("foo . bar").unwrap());
    }
}
