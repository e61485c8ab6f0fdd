//! inibake - Build runner for INI-shaped automation scripts
//!
//! Runs a project (a directory holding `script.project`) or a single
//! `.script` file and prints the build log.
//!
//! # Usage
//!
//! ```bash
//! # Run every selected script of a project
//! inibake run projects/Demo
//!
//! # Run one script of the project, printing JSON lines
//! inibake run projects/Demo --script Apps/Tools.script --json
//!
//! # Compile all code sections without running anything
//! inibake check projects/Demo
//!
//! # Escape text for use as an operand
//! inibake escape "a,b c" --full
//! ```

mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use inibake_core::check::{check_project, SectionError};
use inibake_core::config::EngineConfig;
use inibake_core::engine::EngineState;
use inibake_core::error::ScriptError;
use inibake_core::escaper::{escape, unescape};
use inibake_core::log::LogState;
use inibake_core::registry::MemoryRegistry;
use inibake_core::script::{Project, Script};

use report::OutputFormat;

#[derive(Parser)]
#[command(name = "inibake")]
#[command(about = "Run and check INI-shaped automation scripts")]
#[command(version)]
struct Cli {
    /// Emit diagnostics on stderr as JSON
    #[arg(long, global = true, env = "INIBAKE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a project directory or a single script
    Run {
        /// Project directory or .script file
        path: PathBuf,

        /// Run only this script of the project (path or file name)
        #[arg(short, long)]
        script: Option<String>,

        /// Print the build log as JSON lines instead of a trace
        #[arg(long)]
        json: bool,

        /// Also write the build log as JSON lines to this file
        #[arg(long, env = "INIBAKE_LOG_FILE")]
        log_file: Option<PathBuf>,

        /// Halt the build on the first error
        #[arg(long, env = "INIBAKE_STOP_ON_ERROR")]
        stop_on_error: bool,

        /// Deepest allowed chain of section calls
        #[arg(long, env = "INIBAKE_MAX_DEPTH")]
        max_depth: Option<usize>,

        /// Print the registry contents as JSON after the build
        #[arg(long)]
        dump_registry: bool,
    },

    /// Compile every code section and report grammar errors
    Check {
        /// Project directory or .script file
        path: PathBuf,
    },

    /// Escape text so it survives operand splitting
    Escape {
        text: String,

        /// Also escape spaces, tabs and newlines
        #[arg(long)]
        full: bool,

        /// Also escape percent signs
        #[arg(long)]
        percent: bool,
    },

    /// Reverse `escape`
    Unescape {
        text: String,

        /// Also unescape spaces, tabs and newlines
        #[arg(long)]
        full: bool,

        /// Also unescape percent signs
        #[arg(long)]
        percent: bool,
    },
}

#[derive(Debug)]
enum CliError {
    /// The build ran but logged errors.
    BuildFailed(usize),
    /// The project could not be loaded or compiled.
    Load(ScriptError),
    Grammar(Vec<SectionError>),
    /// The build was halted by a critical error.
    Critical(String),
    Io(std::io::Error),
    Json(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::BuildFailed(_) => ExitCode::from(1),
            CliError::Load(_) | CliError::Grammar(_) => ExitCode::from(2),
            CliError::Critical(_) => ExitCode::from(3),
            CliError::Io(_) | CliError::Json(_) => ExitCode::from(1),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::BuildFailed(n) => write!(f, "Build finished with {} error(s)", n),
            CliError::Load(e) => write!(f, "{}", e),
            CliError::Grammar(errors) => write!(f, "{} section(s) failed to compile", errors.len()),
            CliError::Critical(msg) => write!(f, "Build halted: {}", msg),
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::Json(msg) => write!(f, "JSON error: {}", msg),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = EngineConfig::load();
    let _guard = init_logging(&config, cli.log_json);

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

/// Diagnostics go to stderr; a rolling file is added when the config names
/// a log directory.
fn init_logging(config: &EngineConfig, json: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match config.log_dir.as_ref() {
        Some(_) => {
            let log_dir = config.log_dir();
            if std::fs::create_dir_all(&log_dir).is_ok() {
                let appender = tracing_appender::rolling::daily(&log_dir, "inibake.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false);
                (Some(layer), Some(guard))
            } else {
                (None, None)
            }
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

fn run(cli: Cli, config: EngineConfig) -> Result<(), CliError> {
    match cli.command {
        Command::Run {
            path,
            script,
            json,
            log_file,
            stop_on_error,
            max_depth,
            dump_registry,
        } => {
            let mut config = config;
            config.stop_on_error |= stop_on_error;
            if let Some(depth) = max_depth {
                config.max_call_depth = depth;
            }
            let format = if json { OutputFormat::Json } else { OutputFormat::Trace };
            run_build(
                &path,
                script.as_deref(),
                config,
                format,
                log_file.as_deref(),
                dump_registry,
            )
        }
        Command::Check { path } => {
            let project = load_project(&path)?;
            let errors = check_project(&project, config.max_nesting_depth);
            if errors.is_empty() {
                println!("{}: {} script(s) OK", project.title(), project.scripts().len());
                Ok(())
            } else {
                for error in &errors {
                    println!("{}", error);
                }
                Err(CliError::Grammar(errors))
            }
        }
        Command::Escape { text, full, percent } => {
            println!("{}", escape(&text, full, percent));
            Ok(())
        }
        Command::Unescape { text, full, percent } => {
            println!("{}", unescape(&text, full, percent));
            Ok(())
        }
    }
}

fn load_project(path: &Path) -> Result<Project, CliError> {
    if path.is_dir() {
        Project::load(path).map_err(CliError::Load)
    } else {
        Script::load(path).map(Project::single).map_err(CliError::Load)
    }
}

fn run_build(
    path: &Path,
    script: Option<&str>,
    config: EngineConfig,
    format: OutputFormat,
    log_file: Option<&Path>,
    dump_registry: bool,
) -> Result<(), CliError> {
    let project = load_project(path)?;

    let errors = check_project(&project, config.max_nesting_depth);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("{}", error);
        }
        return Err(CliError::Grammar(errors));
    }

    let scripts = match script {
        Some(name) => {
            let found = project.find(name).ok_or_else(|| {
                CliError::Load(ScriptError::execution(format!(
                    "Script [{}] is not part of project [{}]",
                    name,
                    project.title()
                )))
            })?;
            vec![found]
        }
        None => project.build_order(),
    };

    let registry = Arc::new(MemoryRegistry::new());
    let mut state = EngineState::new(project, config).with_registry(registry.clone());

    let started = chrono::Local::now();
    let event = state.run_scripts(&scripts);
    let log = state.log();

    report::print_log(log, format)?;
    if let Some(file) = log_file {
        report::write_log_file(log, file)?;
    }
    if dump_registry {
        let dump = registry.to_json().map_err(|e| CliError::Json(e.to_string()))?;
        let text = serde_json::to_string_pretty(&dump).map_err(|e| CliError::Json(e.to_string()))?;
        println!("{}", text);
    }
    report::print_summary(log, &event.to_string(), started);

    if let Some(critical) = log
        .entries()
        .iter()
        .find(|e| e.state == LogState::CriticalError)
    {
        return Err(CliError::Critical(critical.message.clone()));
    }
    if log.has_errors() {
        return Err(CliError::BuildFailed(log.count(LogState::Error)));
    }
    Ok(())
}
