use quarry::{
    transform, DynamicResources, ErrorKind, EvalError, Expression, Function, FunctionRegistry, JsonPath,
    JsonSchema, Number, Options, Unmatched, Value,
};
use serde_json::{json, Value as Json};
use std::thread;

fn search(expression: &str, doc: &Json) -> Json {
    Expression::compile(expression)
        .unwrap_or_else(|e| panic!("failed to compile {expression:?}: {e}"))
        .search(doc)
}

fn people() -> Json {
    json!({
        "people": [
            {"name": "George", "age": 30, "tags": ["a", "b"]},
            {"name": "Mary", "age": 20, "tags": ["c"]},
            {"name": "Ann", "age": 19, "tags": []}
        ]
    })
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_filter_projection() {
    assert_eq!(search("people[?age > `20`].name", &people()), json!(["George"]));
    assert_eq!(search("people[?age >= `20`].name", &people()), json!(["George", "Mary"]));
    assert_eq!(search("people[?name == 'Ann'].age", &people()), json!([19]));
}

#[test]
fn test_nested_field() {
    assert_eq!(search("a.b.c", &json!({"a": {"b": {"c": 1}}})), json!(1));
}

#[test]
fn test_missing_field_is_null() {
    assert_eq!(search("y.z", &json!({"x": 1})), Json::Null);
    assert_eq!(search("x.y", &json!({"x": 1})), Json::Null);
}

#[test]
fn test_sum_and_avg() {
    let doc = json!([1, 2, 3, 4, 5]);
    assert_eq!(search("sum(@)", &doc), json!(15));
    assert_eq!(search("avg(@)", &doc), json!(3));
    assert_eq!(search("avg(`[]`)", &doc), Json::Null);
}

#[test]
fn test_slices() {
    let doc = json!([0, 1, 2, 3, 4]);
    assert_eq!(search("[1:3]", &doc), json!([1, 2]));
    assert_eq!(search("[:2]", &doc), json!([0, 1]));
    assert_eq!(search("[::-1]", &doc), json!([4, 3, 2, 1, 0]));
    assert_eq!(search("[::2]", &doc), json!([0, 2, 4]));
    assert_eq!(search("[-2:]", &doc), json!([3, 4]));
    assert_eq!(search("[10:]", &doc), json!([]));
}

#[test]
fn test_negative_index() {
    let doc = json!([0, 1, 2, 3, 4]);
    assert_eq!(search("[-1]", &doc), json!(4));
    assert_eq!(search("[-5]", &doc), json!(0));
    assert_eq!(search("[-6]", &doc), Json::Null);
    assert_eq!(search("[5]", &doc), Json::Null);
}

#[test]
fn test_truthiness() {
    let doc = json!({});
    assert_eq!(search("!`[]`", &doc), json!(true));
    assert_eq!(search("!`[0]`", &doc), json!(false));
    assert_eq!(search("!''", &doc), json!(true));
    assert_eq!(search("!`0`", &doc), json!(false));
    assert_eq!(search("!`{}`", &doc), json!(true));
    assert_eq!(search("!`false`", &doc), json!(true));
}

#[test]
fn test_pipe_materializes_projection() {
    assert_eq!(search("people[*].age | [0]", &people()), json!(30));
    assert_eq!(search("people[*].age[0]", &people()), json!([]));
}

#[test]
fn test_type_mismatch_is_null() {
    assert_eq!(search("`\"abc\"` + `1`", &json!({})), Json::Null);
    assert_eq!(search("abs('x')", &json!({})), Json::Null);
    assert_eq!(search("`1` / `0`", &json!({})), Json::Null);
}

#[test]
fn test_arithmetic() {
    let doc = json!({"a": 1, "b": 2, "c": 3});
    assert_eq!(search("a + b * c", &doc), json!(7));
    assert_eq!(search("(a + b) * c", &doc), json!(9));
    assert_eq!(search("`7` // `2`", &doc), json!(3));
    assert_eq!(search("`7` % `4`", &doc), json!(3));
    assert_eq!(search("`0.1` + `0.2`", &doc), json!(0.3));
    assert_eq!(search("-a", &doc), json!(-1));
}

#[test]
fn test_projections() {
    let doc = json!({
        "reservations": [
            {"instances": [{"id": 1}, {"id": 2}]},
            {"instances": [{"id": 3}]}
        ],
        "ops": {"add": {"numArgs": 2}, "neg": {"numArgs": 1}, "nop": {}}
    });
    assert_eq!(search("reservations[].instances[].id", &doc), json!([1, 2, 3]));
    assert_eq!(search("reservations[*].instances[*].id", &doc), json!([[1, 2], [3]]));
    assert_eq!(search("ops.*.numArgs", &doc), json!([2, 1]));
    assert_eq!(search("people[*].tags[]", &people()), json!(["a", "b", "c"]));
}

#[test]
fn test_multi_select() {
    assert_eq!(
        search("people[0].{n: name, a: age}", &people()),
        json!({"n": "George", "a": 30})
    );
    assert_eq!(search("people[*].[name, age] | [1]", &people()), json!(["Mary", 20]));
    assert_eq!(search("missing.[a, b]", &people()), Json::Null);
}

#[test]
fn test_logical_operators() {
    let doc = json!({"a": null, "b": "x", "c": []});
    assert_eq!(search("a || b", &doc), json!("x"));
    assert_eq!(search("c && b", &doc), json!([]));
    assert_eq!(search("b && c", &doc), json!([]));
    assert_eq!(search("people[?age < `25` && name != 'Ann'].name", &people()), json!(["Mary"]));
}

#[test]
fn test_builtin_functions() {
    let doc = people();
    assert_eq!(search("length(people)", &doc), json!(3));
    assert_eq!(search("length('héllo')", &doc), json!(5));
    assert_eq!(search("sort_by(people, &age)[*].name", &doc), json!(["Ann", "Mary", "George"]));
    assert_eq!(search("max_by(people, &age).name", &doc), json!("George"));
    assert_eq!(search("min_by(people, &age).name", &doc), json!("Ann"));
    assert_eq!(search("join(', ', people[*].name)", &doc), json!("George, Mary, Ann"));
    assert_eq!(search("map(&age, people)", &doc), json!([30, 20, 19]));
    assert_eq!(search("sort(people[*].age)", &doc), json!([19, 20, 30]));
    assert_eq!(search("reverse('abc')", &doc), json!("cba"));
    assert_eq!(search("to_number('12')", &doc), json!(12));
    assert_eq!(search("to_number('x')", &doc), Json::Null);
    assert_eq!(search("to_string(`[1]`)", &doc), json!("[1]"));
    assert_eq!(search("type(people)", &doc), json!("array"));
    assert_eq!(search("keys(people[0])", &doc), json!(["name", "age", "tags"]));
    assert_eq!(search("merge(`{\"a\": 1}`, `{\"a\": 2, \"b\": 3}`)", &doc), json!({"a": 2, "b": 3}));
    assert_eq!(search("not_null(missing, `null`, 'z')", &doc), json!("z"));
    assert_eq!(search("contains(people[*].name, 'Mary')", &doc), json!(true));
    assert_eq!(search("starts_with('quarry', 'qu')", &doc), json!(true));
    assert_eq!(search("floor(`1.5`)", &doc), json!(1));
    assert_eq!(search("ceil(`1.5`)", &doc), json!(2));
}

#[test]
fn test_transform_one_shot() {
    assert_eq!(transform(&people(), "people[1].name").unwrap(), json!("Mary"));
    assert!(transform(&people(), "people[").is_err());
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_compile_is_deterministic() {
    let doc = people();
    let before = doc.clone();
    let first = Expression::compile("people[?age > `19`].name | sort(@)").unwrap();
    let second = Expression::compile("people[?age > `19`].name | sort(@)").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.search(&doc), second.search(&doc));
    assert_eq!(first.search(&doc), first.search(&doc));
    assert_eq!(doc, before);
}

#[test]
fn test_expression_display_and_parse() {
    let expr: Expression = "a.b".parse().unwrap();
    assert_eq!(expr.to_string(), "a.b");
    assert_eq!(expr.as_str(), "a.b");
}

#[test]
fn test_compiled_artifacts_are_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Expression>();
    assert_send_sync::<JsonPath>();
    assert_send_sync::<JsonSchema>();
    assert_send_sync::<FunctionRegistry>();
}

#[test]
fn test_concurrent_searches() {
    let expr = Expression::compile("people[?age > `19`].name").unwrap();
    let docs: Vec<Json> = (0..8)
        .map(|i| json!({"people": [{"name": format!("p{i}"), "age": 20 + i}, {"name": "kid", "age": 3}]}))
        .collect();

    thread::scope(|scope| {
        let handles: Vec<_> = docs
            .iter()
            .map(|doc| scope.spawn(|| expr.search(doc)))
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), json!([format!("p{i}")]));
        }
    });
}

#[test]
fn test_step_budget() {
    let expr = Expression::compile("people[*].tags[*]").unwrap();
    assert_eq!(
        expr.search_with(&people(), &Options::default().with_step_budget(4)),
        Err(EvalError::BudgetExhausted(4))
    );
    assert!(expr.search_with(&people(), &Options::default()).is_ok());
}

#[test]
fn test_deep_expressions() {
    let mut doc = json!(1);
    for _ in 0..200 {
        doc = json!({"a": doc});
    }
    assert_eq!(search(&vec!["a"; 200].join("."), &doc), json!(1));
    assert_eq!(search(&format!("{}a", "!".repeat(200)), &doc), json!(true));
    assert_eq!(search(&format!("{}a", "!".repeat(201)), &doc), json!(false));

    for expression in [vec!["a"; 10_000].join("."), format!("{}a", "!".repeat(10_000))] {
        let kind = Expression::compile(&expression).unwrap_err().kind;
        assert_eq!(kind, ErrorKind::NestingTooDeep);
    }
}

// ============================================================================
// Custom functions
// ============================================================================

struct Double;

impl Function for Double {
    fn name(&self) -> &str {
        "double"
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn evaluate<'a>(
        &self,
        args: &[Value<'a>],
        _resources: &mut DynamicResources<'a>,
    ) -> Result<Value<'a>, Unmatched> {
        let n = args[0].as_number().ok_or(Unmatched)?;
        n.mul(Number::from(2usize)).map(Value::Number).ok_or(Unmatched)
    }
}

#[test]
fn test_custom_function() {
    let mut registry = FunctionRegistry::with_builtins();
    registry.register(Double);

    let expr = Expression::compile_with("people[*].age | map(&double(@), @)", &registry).unwrap();
    assert_eq!(expr.search(&people()), json!([60, 40, 38]));

    let expr = Expression::compile_with("double(people[0].name)", &registry).unwrap();
    assert_eq!(expr.search(&people()), Json::Null);

    assert!(Expression::compile("double(`1`)").is_err());

    let path = JsonPath::compile_with("$.people[?double(@.age) > 50].name", &registry).unwrap();
    assert_eq!(path.query(&people()), json!(["George"]));
}
