use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use alk_lsp::LspConfig;
use alk_runtime::{
    BackendOptions, DebugEvent, InitialState, OutputCategory, RuntimeConfig, collect_errors,
    spawn_run,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, LabeledSpan, NamedSource, miette};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::terminal::TerminalFrontend;

#[derive(Parser, Debug)]
#[command(name = "alk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To run a program:\n\
    alk run main.alk\n\n\
    ## To explore every execution path with an initial state:\n\
    alk run --exhaustive --init 'x=3' main.alk\n\n\
    ## To serve the debug adapter on stdio:\n\
    alk dap\n\n\
    ## To serve the language server on stdio:\n\
    alk lsp")]
#[command(
    about = "alk runs Alk programs and connects editors to the Alk interpreter.",
    long_about = None
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Commands,
}

#[derive(Clone, Debug, clap::Args, Default)]
struct BackendArgs {
    /// Path to the interpreter (defaults to $ALK_INTERPRETER, then `alki.sh`)
    #[arg(long, value_name = "PATH")]
    interpreter: Option<PathBuf>,

    /// Print metadata about the execution
    #[arg(short = 'm', long, default_value_t = false)]
    metadata: bool,

    /// Precision used for floating point values
    #[arg(short = 'p', long)]
    precision: Option<u32>,

    /// Execute symbolically, with Z3 as the solver
    #[arg(short = 's', long, default_value_t = false)]
    symbolic: bool,

    /// Initial binding for a variable, repeatable
    #[arg(short = 'i', long = "init", value_name = "NAME=VALUE", value_parser = parse_binding)]
    init: Vec<(String, String)>,

    /// Load the initial state from a file
    #[arg(long, value_name = "FILE", conflicts_with = "init")]
    state_file: Option<PathBuf>,

    /// Longest silence tolerated from the interpreter, in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
}

fn parse_binding(text: &str) -> Result<(String, String), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{text}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in `{text}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl BackendArgs {
    /// Defaults, then `alk.toml` next to `program`, then the flags given here.
    fn config(&self, program: Option<&Path>) -> miette::Result<RuntimeConfig> {
        let mut config = RuntimeConfig::default();
        if let Some(program) = program {
            config = config.discover(program).into_diagnostic()?;
        }

        if let Some(interpreter) = &self.interpreter {
            config.interpreter = interpreter.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }

        let initial_state = if let Some(file) = &self.state_file {
            Some(InitialState::File(file.clone()))
        } else if !self.init.is_empty() {
            Some(InitialState::Text(self.init.clone()))
        } else {
            config.options.initial_state.take()
        };

        config.options = BackendOptions {
            metadata: self.metadata || config.options.metadata,
            precision: self.precision.or(config.options.precision),
            symbolic_execution: self.symbolic || config.options.symbolic_execution,
            initial_state,
        };
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a program and stream its output
    Run {
        #[clap(flatten)]
        backend: BackendArgs,
        /// Explore every execution path
        #[arg(short = 'e', long, default_value_t = false)]
        exhaustive: bool,
        /// Path to the Alk program
        file: PathBuf,
    },
    /// Start a debug adapter on stdio
    Dap,
    /// Start a language server on stdio
    Lsp {
        #[clap(flatten)]
        backend: BackendArgs,
    },
}

fn init_stderr_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        match &self.commands {
            Commands::Run {
                backend,
                exhaustive,
                file,
            } => {
                if !file.exists() {
                    return Err(miette!("File not found: {}", file.display()));
                }
                init_stderr_logging("warn");
                let config = backend.config(Some(file))?;

                tokio::runtime::Runtime::new()
                    .into_diagnostic()?
                    .block_on(run_program(config, file, *exhaustive))
            }
            Commands::Dap => alk_dap::start().map_err(|e| miette!(e.to_string())),
            Commands::Lsp { backend } => {
                init_stderr_logging("alk_lsp=info");
                let config = backend.config(None)?;

                tokio::runtime::Runtime::new()
                    .into_diagnostic()?
                    .block_on(async { alk_lsp::start(LspConfig::new(config)).await })
                    .into_diagnostic()
            }
        }
    }
}

async fn run_program(config: RuntimeConfig, program: &Path, exhaustive: bool) -> miette::Result<()> {
    debug!(program = %program.display(), exhaustive, "Running program");
    let frontend = Arc::new(TerminalFrontend::stdin());
    let (dispatcher, interpreter, mut events) =
        spawn_run(&config, program, exhaustive, frontend).into_diagnostic()?;

    let mut transcript = Vec::new();
    let mut record = |event: DebugEvent| match event {
        DebugEvent::Output {
            category: OutputCategory::Stderr,
            text,
        } => {
            eprint!("{text}");
            transcript.extend(text.lines().map(String::from));
        }
        DebugEvent::Output {
            category: OutputCategory::Console,
            text,
        } => eprintln!("{}", text.dimmed()),
        DebugEvent::Output { text, .. } => {
            println!("{text}");
            transcript.push(text);
        }
        _ => {}
    };

    while let Some(event) = events.recv().await {
        if event == DebugEvent::Terminated {
            break;
        }
        record(event);
    }
    while let Ok(event) = events.try_recv() {
        record(event);
    }

    drop(dispatcher);
    let _ = interpreter.await;

    report_errors(program, &transcript)
}

/// Byte offset of a one-based line and zero-based column, clamped to the line.
fn source_offset(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            let content = text.trim_end_matches(['\n', '\r']);
            return offset
                + content
                    .char_indices()
                    .nth(column)
                    .map_or(content.len(), |(i, _)| i);
        }
        offset += text.len();
    }
    source.len()
}

fn report_errors(program: &Path, transcript: &[String]) -> miette::Result<()> {
    let errors = collect_errors(transcript.iter().map(String::as_str));
    if errors.is_empty() {
        return Ok(());
    }

    let name = program.display().to_string();
    let source = fs::read_to_string(program).unwrap_or_default();
    let count: usize = errors.values().map(Vec::len).sum();

    eprintln!("{}", format!("Checking: {name}").bold());
    for error in errors.values().flatten() {
        let offset = source_offset(&source, error.line, error.column);
        let report = miette!(
            labels = vec![LabeledSpan::at_offset(offset, error.message.clone())],
            "{} at line {}, column {}",
            error.message,
            error.line,
            error.column
        )
        .with_source_code(NamedSource::new(&name, source.clone()));
        eprintln!("{report:?}");
    }

    Err(miette!(
        "{}: {count} error(s) in {name}",
        "Error".red().bold()
    ))
}
