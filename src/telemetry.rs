use std::cmp::Reverse;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

use crate::config::LoggingSettings;

const LOG_FILE_SUFFIX: &str = ".log.jsonl";
const MAX_NAME_ATTEMPTS: usize = 100;

static LOG_FILE: OnceCell<LogFileHandle> = OnceCell::new();

struct LogFileHandle {
    path: PathBuf,
    _guard: WorkerGuard,
}

/// Install the global subscriber: console output filtered by `RUST_LOG` (or
/// `modelbench=info|debug`), plus JSON lines in a log file when enabled.
///
/// Calling it again after a successful install is a no-op.
pub fn init_tracing(service: &str, verbose: bool, logging: &LoggingSettings) -> Result<()> {
    if LOG_FILE.get().is_some() || tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let directive = if verbose {
        "modelbench=debug"
    } else {
        "modelbench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let log_file = if logging.json_file {
        Some(LogFile::open(service, logging)?)
    } else {
        None
    };
    let (file_layer, handle) = match log_file {
        Some(log_file) => {
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(log_file.writer);
            let handle = LogFileHandle {
                path: log_file.path,
                _guard: log_file.guard,
            };
            (Some(layer), Some(handle))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(handle) = handle {
        let _ = LOG_FILE.set(handle);
    }
    Ok(())
}

/// Log file written by this process, if file logging is on.
pub fn current_log_file() -> Option<&'static Path> {
    LOG_FILE.get().map(|handle| handle.path.as_path())
}

/// Freshly created JSON-lines log file and its background writer.
struct LogFile {
    path: PathBuf,
    writer: NonBlocking,
    guard: WorkerGuard,
}

impl LogFile {
    fn open(service: &str, settings: &LoggingSettings) -> Result<Self> {
        let directory = settings.resolve_directory()?;
        fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

        let (file, path) = create_unique(&directory, service)?;
        prune_service_logs(&directory, service, settings.max_files, &path)?;

        let (writer, guard) = tracing_appender::non_blocking(file);
        Ok(Self {
            path,
            writer,
            guard,
        })
    }
}

/// Create `<service>-<utc timestamp>[-n].log.jsonl` without clobbering a
/// file another process created in the same second.
fn create_unique(directory: &Path, service: &str) -> Result<(fs::File, PathBuf)> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = match attempt {
            0 => format!("{service}-{stamp}{LOG_FILE_SUFFIX}"),
            n => format!("{service}-{stamp}-{n}{LOG_FILE_SUFFIX}"),
        };
        let path = directory.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to open log file {}", path.display()));
            }
        }
    }
    bail!("no free log file name in {}", directory.display())
}

/// Delete this service's oldest log files so that at most `max_files`
/// remain, counting `active`. Zero disables pruning.
fn prune_service_logs(directory: &Path, service: &str, max_files: usize, active: &Path) -> Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let prefix = format!("{service}-");
    let mut older: Vec<(SystemTime, PathBuf)> = fs::read_dir(directory)
        .with_context(|| format!("Failed to read log directory {}", directory.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_name().to_str().is_some_and(|name| {
                name.starts_with(&prefix) && name.ends_with(LOG_FILE_SUFFIX)
            })
        })
        .map(|entry| entry.path())
        .filter(|path| path != active && path.is_file())
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|meta| meta.modified()).ok()?;
            Some((modified, path))
        })
        .collect();

    older.sort_by_key(|(modified, _)| Reverse(*modified));
    for (_, path) in older.into_iter().skip(max_files - 1) {
        let _ = fs::remove_file(&path);
    }
    Ok(())
}
