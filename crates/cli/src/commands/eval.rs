use std::path::Path;
use std::process;

use parley_core::{classify_emitted, EmitBuilder, FileAccess, Part};
use parley_eval::{document_environment, eval_expression, to_emit_value};
use serde::Serialize;

use super::{print_json, read_source, summarize};
use crate::{report_failure, OutputFormat};

#[derive(Serialize)]
struct EvalOutput<'a> {
    expression: &'a str,
    parts: Vec<Part>,
}

pub(crate) fn cmd_eval(
    document: &Path,
    expression: &str,
    files: &FileAccess,
    output: OutputFormat,
    quiet: bool,
) {
    let source = read_source(document, output, quiet);

    let mut env = match document_environment(document, &source, files) {
        Ok(env) => env,
        Err(e) => {
            report_failure(&e.to_string(), &e.to_diagnostic(), output, quiet);
            process::exit(1);
        }
    };

    let value = match eval_expression(expression, &mut env) {
        Ok(value) => value,
        Err(e) => {
            report_failure(&e.to_string(), &e.to_diagnostic(None), output, quiet);
            process::exit(1);
        }
    };

    let mut builder = EmitBuilder::new();
    builder.emit(&to_emit_value(value));
    let (emitted, _) = builder.finish();
    let parts: Vec<Part> = emitted.iter().map(classify_emitted).collect();

    match output {
        OutputFormat::Json => print_json(&EvalOutput {
            expression: expression.trim(),
            parts,
        }),
        OutputFormat::Text => {
            for part in &parts {
                println!("{}", summarize(part));
            }
        }
    }
}
