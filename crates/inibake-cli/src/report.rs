use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};

use inibake_core::log::{BuildLog, LogState};

/// How the build log is printed to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Indented, one entry per line.
    Trace,
    /// One JSON object per line.
    Json,
}

pub fn print_log(log: &BuildLog, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Trace => out.write_all(log.render_trace().as_bytes())?,
        OutputFormat::Json => log.write_jsonl(&mut out)?,
    }
    out.flush()
}

pub fn write_log_file(log: &BuildLog, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    log.write_jsonl(&mut writer)?;
    writer.flush()
}

/// One line on stderr, so stdout stays machine-readable with `--json`.
pub fn print_summary(log: &BuildLog, event: &str, started: DateTime<Local>) {
    let elapsed = Local::now().signed_duration_since(started);
    eprintln!(
        "Build ended with {} in {}.{:03}s: {} error(s), {} warning(s)",
        event,
        elapsed.num_seconds(),
        elapsed.num_milliseconds().rem_euclid(1000),
        log.count(LogState::Error) + log.count(LogState::CriticalError),
        log.count(LogState::Warning),
    );
}
