use flexi_logger::{DeferredNow, FileSpec, Logger, LoggerHandle, WriteMode};
use log::Record;
use shared::errors::BootstrapError;
use std::io::Write;
use std::thread;

/// Initializes the engine's logger, writing to `log_file` in append mode.
/// Returned handle must be kept alive for the life of the process; dropping
/// it stops logging.
pub fn init_logger(log_file: &str) -> Result<LoggerHandle, BootstrapError> {
    let path = std::path::Path::new(log_file);
    let (directory, basename) = match (path.parent(), path.file_stem()) {
        (Some(dir), Some(stem)) if !dir.as_os_str().is_empty() => {
            (dir.to_string_lossy().into_owned(), stem.to_string_lossy().into_owned())
        }
        _ => (".".to_owned(), "heappulse".to_owned()),
    };

    Logger::try_with_str("heappulse=info")
        .map_err(|e| BootstrapError::LogSink {
            path: log_file.to_owned(),
            source: Box::new(e),
        })?
        .log_to_file(
            FileSpec::default()
                .directory(directory)
                .basename(basename)
                .suppress_timestamp(),
        )
        .append()
        .write_mode(WriteMode::BufferAndFlush)
        .format(log_format)
        .start()
        .map_err(|e| BootstrapError::LogSink {
            path: log_file.to_owned(),
            source: Box::new(e),
        })
}

fn log_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
    write!(
        w,
        "{} [{:<5}] [{}:{}] [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        record.level(),
        record.file().unwrap_or("<unknown>"),
        record.line().unwrap_or(0),
        thread::current().name().unwrap_or("<unnamed>"),
        &record.args()
    )
}
