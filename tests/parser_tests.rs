use quarry::{
    ast::{Ast, BinaryOperator, ProjectionKind, Slice, UnaryOperator},
    parser, ErrorKind, Expression, FunctionRegistry, ParseError,
};
use serde_json::json;

fn parse(input: &str) -> Ast {
    parser::parse(input, FunctionRegistry::builtins())
        .unwrap_or_else(|e| panic!("failed to parse {input:?}: {e}"))
}

fn parse_err(input: &str) -> ParseError {
    match parser::parse(input, FunctionRegistry::builtins()) {
        Ok(ast) => panic!("expected {input:?} to fail, got {ast:?}"),
        Err(e) => e,
    }
}

fn is_field(ast: &Ast, expected: &str) -> bool {
    matches!(ast, Ast::Field(name) if name == expected)
}

// ============================================================================
// Shapes
// ============================================================================

#[test]
fn test_parse_field() {
    assert!(is_field(&parse("foo"), "foo"));
    assert!(is_field(&parse("\"with space\""), "with space"));
    assert!(is_field(&parse("  foo  "), "foo"));
}

#[test]
fn test_parse_subexpression() {
    let Ast::Subexpression { lhs, rhs } = parse("a.b") else {
        panic!("expected subexpression");
    };
    assert!(is_field(&lhs, "a"));
    assert!(is_field(&rhs, "b"));
}

#[test]
fn test_parse_current_node() {
    assert!(matches!(parse("@"), Ast::Identity));
}

#[test]
fn test_parse_index_and_slice() {
    assert!(matches!(parse("[0]"), Ast::Index(0)));
    assert!(matches!(parse("[-1]"), Ast::Index(-1)));

    let Ast::Projection { kind: ProjectionKind::List, lhs, rhs } = parse("[1:3]") else {
        panic!("expected list projection");
    };
    assert!(matches!(
        *lhs,
        Ast::Slice(Slice { start: Some(1), stop: Some(3), step: 1 })
    ));
    assert!(matches!(*rhs, Ast::Identity));

    let Ast::Projection { lhs, .. } = parse("a[::-1]") else {
        panic!("expected list projection");
    };
    let Ast::Subexpression { rhs, .. } = *lhs else {
        panic!("expected a[...]");
    };
    assert!(matches!(
        *rhs,
        Ast::Slice(Slice { start: None, stop: None, step: -1 })
    ));
}

#[test]
fn test_parse_wildcards() {
    let Ast::Projection { kind: ProjectionKind::List, lhs, rhs } = parse("people[*].name") else {
        panic!("expected list projection");
    };
    assert!(is_field(&lhs, "people"));
    assert!(is_field(&rhs, "name"));

    let Ast::Projection { kind: ProjectionKind::Object, lhs, rhs } = parse("ops.*.numArgs") else {
        panic!("expected object projection");
    };
    assert!(is_field(&lhs, "ops"));
    assert!(is_field(&rhs, "numArgs"));

    assert!(matches!(
        parse("*"),
        Ast::Projection { kind: ProjectionKind::Object, .. }
    ));
}

#[test]
fn test_parse_flatten() {
    let Ast::Projection { kind: ProjectionKind::Flatten, lhs, rhs } = parse("a[].b") else {
        panic!("expected flatten");
    };
    assert!(is_field(&lhs, "a"));
    assert!(is_field(&rhs, "b"));
}

#[test]
fn test_parse_filter() {
    let Ast::Projection { kind: ProjectionKind::Filter(predicate), lhs, rhs } =
        parse("people[?age > `20`].name")
    else {
        panic!("expected filter projection");
    };
    assert!(is_field(&lhs, "people"));
    assert!(is_field(&rhs, "name"));
    let Ast::Binary { op: BinaryOperator::GreaterThan, lhs, rhs } = *predicate else {
        panic!("expected comparison");
    };
    assert!(is_field(&lhs, "age"));
    assert!(matches!(*rhs, Ast::Literal(ref v) if *v == json!(20)));
}

#[test]
fn test_pipe_stops_projection() {
    let Ast::Pipe { lhs, rhs } = parse("people[*].age | [0]") else {
        panic!("expected pipe");
    };
    assert!(matches!(*lhs, Ast::Projection { .. }));
    assert!(matches!(*rhs, Ast::Index(0)));
}

#[test]
fn test_comparison_closes_projection() {
    let Ast::Binary { op: BinaryOperator::Equal, lhs, .. } = parse("a[*].b == `1`") else {
        panic!("expected comparison at the top");
    };
    assert!(matches!(*lhs, Ast::Projection { .. }));
}

#[test]
fn test_logical_precedence() {
    let Ast::Binary { op: BinaryOperator::Or, lhs, rhs } = parse("a || b && c") else {
        panic!("expected ||");
    };
    assert!(is_field(&lhs, "a"));
    assert!(matches!(*rhs, Ast::Binary { op: BinaryOperator::And, .. }));

    let Ast::Binary { op: BinaryOperator::And, lhs, .. } = parse("a == b && c") else {
        panic!("expected &&");
    };
    assert!(matches!(*lhs, Ast::Binary { op: BinaryOperator::Equal, .. }));
}

#[test]
fn test_arithmetic_precedence() {
    let Ast::Binary { op: BinaryOperator::Add, lhs, rhs } = parse("a + b * c") else {
        panic!("expected +");
    };
    assert!(is_field(&lhs, "a"));
    assert!(matches!(*rhs, Ast::Binary { op: BinaryOperator::Multiply, .. }));

    // Left associative
    let Ast::Binary { op: BinaryOperator::Subtract, lhs, rhs } = parse("a - b - c") else {
        panic!("expected -");
    };
    assert!(matches!(*lhs, Ast::Binary { op: BinaryOperator::Subtract, .. }));
    assert!(is_field(&rhs, "c"));

    assert!(matches!(
        parse("a // b"),
        Ast::Binary { op: BinaryOperator::IntegerDivide, .. }
    ));
}

#[test]
fn test_parentheses_group() {
    let Ast::Binary { op: BinaryOperator::Multiply, lhs, .. } = parse("(a + b) * c") else {
        panic!("expected *");
    };
    assert!(matches!(*lhs, Ast::Binary { op: BinaryOperator::Add, .. }));
}

#[test]
fn test_not_applies_to_chain() {
    let Ast::Unary { op: UnaryOperator::Not, operand } = parse("!a.b") else {
        panic!("expected !");
    };
    assert!(matches!(*operand, Ast::Subexpression { .. }));

    let Ast::Binary { op: BinaryOperator::Equal, lhs, .. } = parse("!a == b") else {
        panic!("expected ==");
    };
    assert!(matches!(*lhs, Ast::Unary { op: UnaryOperator::Not, .. }));
}

#[test]
fn test_parse_literals() {
    assert!(matches!(parse("`[1, 2]`"), Ast::Literal(ref v) if *v == json!([1, 2])));
    assert!(matches!(parse(r#"`"a\`b"`"#), Ast::Literal(ref v) if *v == json!("a`b")));
    assert!(matches!(parse("'raw'"), Ast::Literal(ref v) if *v == json!("raw")));
    assert!(matches!(parse(r"'it\'s'"), Ast::Literal(ref v) if *v == json!("it's")));
    assert!(matches!(parse(r"'a\b'"), Ast::Literal(ref v) if *v == json!("a\\b")));
}

#[test]
fn test_parse_string_escapes() {
    assert!(is_field(&parse(r#""a\nb""#), "a\nb"));
    assert!(is_field(&parse(r#""é""#), "é"));
    assert!(is_field(&parse(r#""😀""#), "😀"));
}

#[test]
fn test_parse_multi_select() {
    let Ast::MultiSelectList(items) = parse("[a, b.c]") else {
        panic!("expected list");
    };
    assert_eq!(items.len(), 2);

    let Ast::MultiSelectHash(entries) = parse("{x: a, \"y z\": b}") else {
        panic!("expected hash");
    };
    let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["x", "y z"]);

    let Ast::Subexpression { lhs, rhs } = parse("a.[b, c]") else {
        panic!("expected chained list");
    };
    assert!(is_field(&lhs, "a"));
    assert!(matches!(*rhs, Ast::MultiSelectList(_)));
}

#[test]
fn test_parse_functions() {
    let Ast::Function { function, args } = parse("sort_by(people, &age)") else {
        panic!("expected call");
    };
    assert_eq!(function.name(), "sort_by");
    assert!(is_field(&args[0], "people"));
    assert!(matches!(args[1], Ast::ExpressionRef(_)));

    let Ast::Function { function, args } = parse("not_null(a, b, c, d)") else {
        panic!("expected variadic call");
    };
    assert_eq!(function.name(), "not_null");
    assert_eq!(args.len(), 4);

    assert!(matches!(parse("a.length(@)"), Ast::Subexpression { .. }));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_kinds() {
    assert_eq!(parse_err("a.").kind, ErrorKind::UnexpectedEndOfInput);
    assert_eq!(parse_err("(a").kind, ErrorKind::UnexpectedEndOfInput);
    assert_eq!(parse_err("a ||").kind, ErrorKind::UnexpectedEndOfInput);
    assert_eq!(parse_err("[::0]").kind, ErrorKind::StepCannotBeZero);
    assert_eq!(parse_err("a b").kind, ErrorKind::ExpectedDot);
    assert_eq!(parse_err("a.]").kind, ErrorKind::ExpectedIdentifier);
    assert_eq!(parse_err("{a b}").kind, ErrorKind::ExpectedColon);
    assert_eq!(parse_err("a = b").kind, ErrorKind::ExpectedComparator);
    assert_eq!(parse_err("a[1 2]").kind, ErrorKind::ExpectedRightBracket);
    assert_eq!(parse_err("`{bad`").kind, ErrorKind::InvalidLiteral);
    assert_eq!(parse_err(r#""\q""#).kind, ErrorKind::IllegalEscapeCharacter);
    assert_eq!(parse_err(r#""\udc00""#).kind, ErrorKind::InvalidCodepoint);
    assert_eq!(parse_err(r#""\ud83dx""#).kind, ErrorKind::InvalidCodepoint);
}

#[test]
fn test_function_errors() {
    assert_eq!(
        parse_err("nope(@)").kind,
        ErrorKind::UnknownFunction("nope".to_string())
    );
    assert_eq!(
        parse_err("abs(@, @)").kind,
        ErrorKind::InvalidArity {
            name: "abs".to_string(),
            expected: 1,
            found: 2
        }
    );
}

#[test]
fn test_error_positions() {
    let e = parse_err("a b");
    assert_eq!((e.line, e.column), (1, 3));

    let e = parse_err("a\n  b");
    assert_eq!((e.line, e.column), (2, 3));
    assert_eq!(e.to_string(), "expected '.' at line 2, column 3");

    // invalid literals point at their opening backtick
    let e = parse_err("foo[?a == `{bad}`]");
    assert_eq!(e.kind, ErrorKind::InvalidLiteral);
    assert_eq!((e.line, e.column), (1, 11));
}

#[test]
fn test_custom_registry_resolves_names() {
    let empty = FunctionRegistry::new();
    assert!(matches!(
        Expression::compile_with("length(@)", &empty),
        Err(ParseError { kind: ErrorKind::UnknownFunction(_), .. })
    ));
}
