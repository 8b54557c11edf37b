//! Running script blocks and single expressions inside an [`Environment`].

use std::collections::BTreeMap;

use parley_core::{EmitValue, IncludePart};
use rhai::{Dynamic, EvalAltResult};
use tracing::{debug, trace};

use crate::env::{Environment, DIRNAME_BINDING, FILENAME_BINDING};
use crate::error::EvalError;

/// Names a script block introduced, with their final values.
pub type Bindings = BTreeMap<String, Dynamic>;

/// Run `code` as a sequence of statements and return every name it bound.
///
/// The bindings stay in `env` as well, and so do any `fn` definitions, which
/// later evaluations in `env` can call. A name bound more than once reports
/// its last value. Failures raised by `include()` are returned as-is;
/// anything else becomes [`EvalError::Load`] (does not compile) or
/// [`EvalError::Execution`] (fails while running).
pub fn execute(code: &str, env: &mut Environment) -> Result<Bindings, EvalError> {
    env.ensure_include();
    let file = env.display_name();
    let before = env.binding_count();

    let ast = env
        .engine
        .compile_with_scope(&env.scope, code)
        .map_err(|e| EvalError::Load {
            file: file.clone(),
            message: e.to_string(),
        })?;

    let program = env.functions.merge(&ast);
    env.engine
        .run_ast_with_scope(&mut env.scope, &program)
        .map_err(|e| script_fault(&e, || EvalError::Execution {
            file: file.clone(),
            message: e.to_string(),
        }))?;
    env.functions.combine(ast.clone_functions_only());

    let mut bindings = Bindings::new();
    for (name, _, value) in env.scope.iter().skip(before) {
        if name == FILENAME_BINDING || name == DIRNAME_BINDING {
            continue;
        }
        bindings.insert(name.to_string(), value);
    }
    debug!(file = %file, names = ?bindings.keys().collect::<Vec<_>>(), "executed script block");
    Ok(bindings)
}

/// Evaluate a single expression and return its value.
///
/// `include()` failures pass through unchanged, including those raised
/// inside nested includes. Any other fault becomes
/// [`EvalError::Evaluation`] naming the file and the expression.
pub fn eval_expression(expr: &str, env: &mut Environment) -> Result<Dynamic, EvalError> {
    env.ensure_include();
    let file = env.display_name();
    let expression = expr.trim();
    trace!(file = %file, expression, "evaluating");

    let evaluation = |message: String| EvalError::Evaluation {
        file: file.clone(),
        expression: expression.to_string(),
        message,
    };

    let ast = env
        .engine
        .compile_expression_with_scope(&env.scope, expression)
        .map_err(|e| evaluation(e.to_string()))?;

    let program = env.functions.merge(&ast);
    env.engine
        .eval_ast_with_scope::<Dynamic>(&mut env.scope, &program)
        .map_err(|e| script_fault(&e, || evaluation(e.to_string())))
}

/// A structured error carried by `e`, or the fallback.
fn script_fault(e: &EvalAltResult, fallback: impl FnOnce() -> EvalError) -> EvalError {
    EvalError::from_script_error(e).unwrap_or_else(fallback)
}

/// Interpret an expression result for emission: `()` emits nothing,
/// include results emit their parts, everything else its text form.
pub fn to_emit_value(value: Dynamic) -> EmitValue {
    if value.is_unit() {
        return EmitValue::Absent;
    }
    if value.is::<IncludePart>() {
        return value
            .try_cast::<IncludePart>()
            .map_or(EmitValue::Absent, EmitValue::Include);
    }
    EmitValue::Text(stringify(value))
}

/// Text form of a script value. Strings are unquoted.
pub fn stringify(value: Dynamic) -> String {
    if value.is_string() {
        return value.into_string().unwrap_or_default();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::create_environment;
    use parley_core::{FileAccess, InMemoryProvider};
    use std::path::Path;

    fn files(entries: &[(&str, &str)]) -> FileAccess {
        FileAccess::in_memory(InMemoryProvider::from_texts(entries.iter().copied()))
    }

    #[test]
    fn execute_reports_new_bindings() {
        let mut env = create_environment(files(&[]));
        let bindings = execute("let a = 1; let b = \"two\"; let a = 3;", &mut env).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings["a"].as_int().unwrap(), 3);
        assert_eq!(bindings["b"].clone().into_string().unwrap(), "two");
        assert!(env.contains("b"));
    }

    #[test]
    fn execute_skips_reserved_names_and_earlier_bindings() {
        let mut env = Environment::for_file(Path::new("/docs/chat.md"), files(&[]));
        env.set("seeded", 1_i64);
        let bindings = execute("let fresh = __dirname;", &mut env).unwrap();
        assert_eq!(bindings.keys().collect::<Vec<_>>(), vec!["fresh"]);
        assert_eq!(stringify(bindings["fresh"].clone()), "/docs");
    }

    #[test]
    fn compile_and_runtime_faults_are_distinguished() {
        let mut env = create_environment(files(&[]));
        let err = execute("let = ;", &mut env).unwrap_err();
        assert!(matches!(err, EvalError::Load { ref file, .. } if file == "<inline>"));

        let err = execute("let y = missing + 1;", &mut env).unwrap_err();
        assert!(matches!(err, EvalError::Execution { .. }));
    }

    #[test]
    fn functions_defined_by_execute_stay_callable() {
        let mut env = create_environment(files(&[]));
        let bindings = execute("fn greet(n) { \"hi \" + n } let who = \"ann\";", &mut env).unwrap();
        assert_eq!(bindings.keys().collect::<Vec<_>>(), vec!["who"]);

        let value = eval_expression("greet(who)", &mut env).unwrap();
        assert_eq!(stringify(value), "hi ann");

        execute("let twice = greet(\"bo\") + greet(\"b\");", &mut env).unwrap();
        assert_eq!(stringify(env.get("twice").unwrap()), "hi bohi b");
    }

    #[test]
    fn expressions_see_bindings() {
        let mut env = create_environment(files(&[]));
        env.set("x", 5_i64);
        let value = eval_expression(" x * 2 ", &mut env).unwrap();
        assert_eq!(value.as_int().unwrap(), 10);
    }

    #[test]
    fn failing_expression_names_file_and_expression() {
        let mut env = Environment::for_file(Path::new("/docs/chat.md"), files(&[]));
        let err = eval_expression(" nope + 1 ", &mut env).unwrap_err();
        match err {
            EvalError::Evaluation {
                file, expression, ..
            } => {
                assert_eq!(file, "/docs/chat.md");
                assert_eq!(expression, "nope + 1");
            }
            other => panic!("expected evaluation error, got {:?}", other),
        }
    }

    #[test]
    fn include_faults_pass_through() {
        let mut env = Environment::for_file(Path::new("/docs/chat.md"), files(&[]));
        let err = eval_expression(r#"include("./missing.txt")"#, &mut env).unwrap_err();
        assert_eq!(
            err,
            EvalError::FileNotFound {
                path: "/docs/missing.txt".into()
            }
        );

        let err = execute(r#"let p = include("./missing.txt");"#, &mut env).unwrap_err();
        assert!(err.is_include_fault());
    }

    #[test]
    fn bindings_do_not_leak_into_includes() {
        let mut env = Environment::for_file(
            Path::new("/docs/chat.md"),
            files(&[("/docs/inc.md", "value: {{ x }}")]),
        );
        execute("let x = 5;", &mut env).unwrap();
        let err = eval_expression(r#"include("inc.md")"#, &mut env).unwrap_err();
        match err {
            EvalError::Evaluation {
                file, expression, ..
            } => {
                assert_eq!(file, "/docs/inc.md");
                assert_eq!(expression, "x");
            }
            other => panic!("expected evaluation error from the include, got {:?}", other),
        }
    }

    #[test]
    fn emit_values() {
        assert_eq!(to_emit_value(Dynamic::UNIT), EmitValue::Absent);
        assert_eq!(to_emit_value(Dynamic::from("hi")), EmitValue::Text("hi".into()));
        assert_eq!(to_emit_value(Dynamic::from(42_i64)), EmitValue::Text("42".into()));
        assert_eq!(to_emit_value(Dynamic::from(true)), EmitValue::Text("true".into()));
    }
}
