use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter, e.g. `flashread=debug`.
pub const LOG_ENV: &str = "FLASHREAD_LOG";
const DEFAULT_FILTER: &str = "flashread=info,tower_http=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Logs to a file; the terminal itself is owned by the UI.
pub fn init_file(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    // a second init in the same process keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init();
    Ok(())
}

/// Logs to stderr, for `flashread serve`.
pub fn init_stderr() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_logger_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("flashread.log");
        init_file(&path).unwrap();
        assert!(path.exists());
    }
}
