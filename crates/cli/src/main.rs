mod commands;
mod config;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use parley_core::{
    Diagnostic, ExtensionMimeResolver, FileAccess, FileCommandMimeResolver, FileSystemProvider,
    MimeResolver,
};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, MimeDetector};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Chat transcript preparation toolkit.
#[derive(Parser)]
#[command(name = "parley", version, about = "Chat transcript preparation toolkit")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress warnings and diagnostics on stderr
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to a configuration file (default: ./parley.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `parley=debug` (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// MIME detection strategy
    #[arg(long, global = true, value_enum)]
    mime: Option<MimeDetector>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a transcript document and print its content parts
    Parts {
        /// Path to the transcript document
        document: PathBuf,
    },

    /// Tokenize a file's content into text and file-reference chunks
    Chunks {
        /// Path to the content file; references resolve relative to it
        file: PathBuf,
    },

    /// Evaluate an expression against a document's frontmatter bindings
    Eval {
        /// Path to the transcript document
        document: PathBuf,
        /// Expression to evaluate, e.g. `include("notes.md")`
        expression: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(msg) => {
            report_error(&format!("error: {}", msg), cli.output, cli.quiet);
            process::exit(1);
        }
    };
    init_telemetry(&cli, &config);

    let files = file_access(cli.mime.unwrap_or(config.mime.detector));

    match cli.command {
        Commands::Parts { document } => {
            commands::parts::cmd_parts(&document, &files, cli.output, cli.quiet);
        }
        Commands::Chunks { file } => {
            commands::chunks::cmd_chunks(&file, &files, cli.output, cli.quiet);
        }
        Commands::Eval {
            document,
            expression,
        } => {
            commands::eval::cmd_eval(&document, &expression, &files, cli.output, cli.quiet);
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_telemetry(cli: &Cli, config: &Config) {
    let directive = cli.log_level.as_deref().unwrap_or(&config.log.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let registry = tracing_subscriber::registry().with(filter);

    if config.log.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn file_access(detector: MimeDetector) -> FileAccess {
    let mime: Arc<dyn MimeResolver> = match detector {
        MimeDetector::FileCommand => {
            let resolver = FileCommandMimeResolver::new();
            if !resolver.is_available() {
                debug!("`file` utility not available; falling back to extension table");
            }
            Arc::new(resolver)
        }
        MimeDetector::Extension => Arc::new(ExtensionMimeResolver),
    };
    FileAccess::new(Arc::new(FileSystemProvider), mime)
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            let value = serde_json::json!({ "error": msg });
            eprintln!("{}", value);
        }
    }
}

/// Report a fatal failure: `text` in text mode, the structured diagnostic
/// in JSON mode.
pub(crate) fn report_failure(text: &str, diagnostic: &Diagnostic, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", text),
        OutputFormat::Json => {
            let pretty = serde_json::to_string_pretty(&diagnostic.to_json_value())
                .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", text.replace('"', "\\\"")));
            eprintln!("{}", pretty);
        }
    }
}

/// Print a batch of non-fatal diagnostics to stderr.
pub(crate) fn report_diagnostics(heading: &str, diagnostics: &[Diagnostic], output: OutputFormat, quiet: bool) {
    if quiet || diagnostics.is_empty() {
        return;
    }
    match output {
        OutputFormat::Text => {
            eprintln!("warning: {}:", heading);
            for d in diagnostics {
                eprintln!("  {}", d);
            }
        }
        OutputFormat::Json => {
            let values: Vec<_> = diagnostics.iter().map(Diagnostic::to_json_value).collect();
            let pretty = serde_json::to_string_pretty(&values).unwrap_or_default();
            eprintln!("{}", pretty);
        }
    }
}
