//! Tracing setup for the backend process.
//!
//! Standard error belongs to the scheduler's status channel and standard
//! output to discovery mode, so diagnostics go to a log file under the
//! spool root instead. Filtering follows `PAPERSINK_LOG` (env-filter
//! directives, default `info`). Initialization is best-effort: a backend
//! that cannot open its log file still has to print.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "PAPERSINK_LOG";
pub const LOG_FILE: &str = "backend.log";

/// Installs the global subscriber writing to `<spool_root>/backend.log`.
pub fn init(spool_root: &Path) {
    if std::fs::create_dir_all(spool_root).is_err() {
        return;
    }
    let Ok(file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(spool_root.join(LOG_FILE))
    else {
        return;
    };

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();

    // Route `log` records from dependencies through tracing as well.
    tracing_log::LogTracer::init().ok();
    tracing::subscriber::set_global_default(subscriber).ok();
}
