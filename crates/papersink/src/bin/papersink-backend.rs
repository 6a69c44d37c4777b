//! CUPS backend executable. Installed (mode 0700, owned by root) into the
//! scheduler's `backend/` directory; CUPS invokes it once per job, or with
//! no arguments to discover devices.

use std::process;
use std::sync::atomic::Ordering;

use papersink::error::EXIT_CANCEL;
use papersink::{logging, BackendConfig, CupsBackend, StatusChannel};

fn main() {
    let argv: Vec<String> = std::env::args().collect();

    // Discovery must answer regardless of config or spool health, so it
    // runs before anything that could fail.
    if argv.len() <= 1 {
        let backend = CupsBackend::new(BackendConfig::default());
        process::exit(backend.run(&argv));
    }

    let config = match BackendConfig::resolve() {
        Ok(config) => config,
        Err(e) => {
            StatusChannel::stderr().error(&e);
            process::exit(EXIT_CANCEL);
        }
    };

    logging::init(&config.spool_root);
    tracing::debug!(?argv, "backend invoked");

    let backend = CupsBackend::new(config);

    // The scheduler cancels a job by terminating the backend; stop reading
    // and let the spool handle's cleanup discipline do the rest.
    let cancel = backend.cancel_flag();
    let _ = ctrlc::set_handler(move || {
        cancel.store(true, Ordering::Relaxed);
    });

    process::exit(backend.run(&argv));
}
