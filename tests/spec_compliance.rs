// Data-driven compliance cases.
//
// Each file under tests/compliance holds suites in the JMESPath compliance format: a
// `given` document and cases with either an expected `result` or an `error` class.

use std::{error::Error, fs, path::Path};

use quarry::{ErrorKind, Expression};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct Suite {
    given: Value,
    cases: Vec<Case>,
}

#[derive(Deserialize)]
struct Case {
    expression: String,

    #[serde(default)]
    result: Value,

    #[serde(default)]
    error: Option<String>,
}

fn error_class(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidArity { .. } => "invalid-arity",
        ErrorKind::UnknownFunction(_) => "unknown-function",
        _ => "syntax",
    }
}

fn run_file(path: &Path) -> Result<usize, Box<dyn Error>> {
    let suites: Vec<Suite> = serde_json::from_str(&fs::read_to_string(path)?)?;
    let mut count = 0;
    for suite in suites {
        for case in suite.cases {
            let compiled = Expression::compile(&case.expression);
            match (&case.error, compiled) {
                (Some(expected), Err(e)) => assert_eq!(
                    error_class(&e.kind),
                    expected,
                    "{}: {:?} failed with {e}",
                    path.display(),
                    case.expression
                ),
                (Some(expected), Ok(_)) => panic!(
                    "{}: {:?} should fail with {expected}",
                    path.display(),
                    case.expression
                ),
                (None, Ok(expression)) => assert_eq!(
                    expression.search(&suite.given),
                    case.result,
                    "{}: {:?}",
                    path.display(),
                    case.expression
                ),
                (None, Err(e)) => panic!("{}: {:?} failed: {e}", path.display(), case.expression),
            }
            count += 1;
        }
    }
    Ok(count)
}

#[test]
fn compliance() -> Result<(), Box<dyn Error>> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/compliance");
    let mut files: Vec<_> = fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    assert!(!files.is_empty(), "no compliance files in {}", dir.display());

    for file in files {
        let count = run_file(&file)?;
        println!("{}: {count} cases", file.display());
    }
    Ok(())
}
