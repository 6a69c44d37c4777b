//! The backend protocol handler: the process contract between the print
//! scheduler and the spool/convert/notify core.
//!
//! Invoked with no positional arguments the backend answers device
//! discovery on standard output. Invoked with 5 or 6 it runs one job:
//! spool the payload, convert it to PDF, commit, hand off to the mediator.
//! Every failure is caught here and folded into exactly one exit code plus
//! one `ERROR:` status line — an uncaught crash looks like a hang to the
//! scheduler and can trigger indefinite retries.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info_span, warn};

use crate::config::BackendConfig;
use crate::convert::{Converter, GhostscriptConverter};
use crate::device;
use crate::error::{PayloadError, Result, EXIT_CANCEL, EXIT_OK};
use crate::job::{Payload, PrintJob};
use crate::notify::{Mediator, NotifyOutcome};
use crate::sanitize;
use crate::spool::{SpoolEntry, SpoolStore, WriteHandle};
use crate::status::StatusChannel;

const READ_CHUNK: usize = 64 * 1024;

/// The shared seam between OS-specific invocation contracts (the CUPS argv
/// backend here; a port-monitor adapter elsewhere) and the core.
pub trait ProtocolAdapter {
    /// Enumerates the virtual devices. Must be deterministic and must not
    /// touch the spool or converter.
    fn handle_discovery<W: Write>(&self, out: &mut W) -> io::Result<()>;

    /// Runs one print job to a committed spool entry.
    fn handle_job<R: Read, W: Write>(
        &self,
        job: PrintJob,
        input: &mut R,
        status: &mut StatusChannel<W>,
    ) -> Result<SpoolEntry>;
}

pub struct CupsBackend {
    config: BackendConfig,
    converter: Box<dyn Converter>,
    cancel: Arc<AtomicBool>,
}

impl CupsBackend {
    pub fn new(config: BackendConfig) -> Self {
        let converter = Box::new(GhostscriptConverter::from_config(&config));
        Self::with_converter(config, converter)
    }

    /// Constructor with an injected converter, for tests and for callers
    /// that bring their own distiller.
    pub fn with_converter(config: BackendConfig, converter: Box<dyn Converter>) -> Self {
        Self {
            config,
            converter,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares the flag a signal handler sets when the scheduler cancels
    /// the job. Checked between payload chunks and before commit.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Full invocation contract: dispatches on the positional argument
    /// count and returns the process exit code.
    pub fn run(&self, argv: &[String]) -> i32 {
        let args = argv.get(1..).unwrap_or_default();

        if args.is_empty() {
            return match self.handle_discovery(&mut io::stdout().lock()) {
                Ok(()) => EXIT_OK,
                Err(e) => {
                    error!(error = %e, "discovery output failed");
                    EXIT_CANCEL
                }
            };
        }

        let mut status = StatusChannel::stderr();
        let job = match PrintJob::from_args(args) {
            Ok(job) => job,
            Err(e) => {
                status.error(&e);
                error!(error = %e, "rejected invocation");
                return EXIT_CANCEL;
            }
        };

        match self.handle_job(job, &mut io::stdin().lock(), &mut status) {
            Ok(entry) => {
                debug!(entry = %entry.spool_path.display(), "job complete");
                EXIT_OK
            }
            Err(e) => {
                status.error(&e);
                error!(error = %e, disposition = ?e.disposition(), "job failed");
                e.disposition().exit_code()
            }
        }
    }

    fn spool_payload<R: Read, W: Write>(
        &self,
        job: &PrintJob,
        input: &mut R,
        handle: &mut WriteHandle,
        status: &mut StatusChannel<W>,
    ) -> Result<()> {
        match &job.payload {
            Payload::File(path) => {
                let mut file =
                    std::fs::File::open(path).map_err(|e| PayloadError::InputFile {
                        path: path.clone(),
                        source: e,
                    })?;
                self.copy_payload(&mut file, handle, |e| PayloadError::InputFile {
                    path: path.clone(),
                    source: e,
                })?;
            }
            Payload::Stdin => {
                status.debug("Reading print data from stdin");
                self.copy_payload(input, handle, PayloadError::Stdin)?;
            }
        }
        Ok(())
    }

    fn copy_payload<R: Read>(
        &self,
        reader: &mut R,
        handle: &mut WriteHandle,
        wrap_read_err: impl Fn(io::Error) -> PayloadError,
    ) -> Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(PayloadError::Cancelled.into());
            }
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(wrap_read_err(e).into()),
            };
            handle.write_all(&buf[..n])?;
        }
    }
}

impl ProtocolAdapter for CupsBackend {
    fn handle_discovery<W: Write>(&self, out: &mut W) -> io::Result<()> {
        device::write_discovery(device::default_devices(), out)
    }

    fn handle_job<R: Read, W: Write>(
        &self,
        job: PrintJob,
        input: &mut R,
        status: &mut StatusChannel<W>,
    ) -> Result<SpoolEntry> {
        let _span = info_span!(
            "print_job",
            job_id = %job.job_id,
            user = %job.owning_user,
            title = %sanitize::safe_title(&job.title),
        )
        .entered();

        status.info(format!(
            "Spooling job {} ({} copies)",
            job.job_id, job.copies
        ));

        let store = SpoolStore::new(&self.config.spool_root);
        let mut handle = store.begin(&job.owning_user, &job.job_id, &job.title)?;

        self.spool_payload(&job, input, &mut handle, status)?;
        debug!(bytes = handle.bytes_written(), "payload spooled");

        status.info("Converting document to PDF");
        let raw = handle.finish_payload()?.to_path_buf();
        self.converter.convert(&raw, handle.converted_path())?;

        // A cancel that arrived during conversion must not publish the entry.
        if self.cancel.load(Ordering::Relaxed) {
            return Err(PayloadError::Cancelled.into());
        }

        let entry = handle.commit()?;
        status.info(format!(
            "Job {} spooled as {}",
            job.job_id,
            sanitize::redact_path(&entry.spool_path)
        ));

        let mediator = Mediator::new(
            store.user_dir(&job.owning_user),
            self.config.gui_command.clone(),
        );
        match mediator.notify_or_launch(&entry) {
            Ok(outcome) => {
                debug!(?outcome, "combiner handoff");
                if outcome == NotifyOutcome::Queued {
                    status.warning("Combiner not running; job queued for its next start");
                }
            }
            // The PDF is durable; a missing GUI never fails the print job.
            Err(e) => {
                warn!(error = %e, "combiner handoff failed");
                status.warning(format!("Job saved but combiner not notified: {}", e));
            }
        }

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, ConversionError};
    use std::path::Path;
    use tempfile::TempDir;

    struct CopyConverter;

    impl Converter for CopyConverter {
        fn convert(&self, input: &Path, output: &Path) -> std::result::Result<(), ConversionError> {
            std::fs::copy(input, output)?;
            Ok(())
        }
    }

    fn test_backend(spool_root: &Path) -> CupsBackend {
        let config = BackendConfig {
            spool_root: spool_root.to_path_buf(),
            gui_command: "/nonexistent/papersink-gui".to_string(),
            ..BackendConfig::default()
        };
        CupsBackend::with_converter(config, Box::new(CopyConverter))
    }

    #[test]
    fn test_discovery_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let backend = test_backend(tmp.path());
        let mut first = Vec::new();
        let mut second = Vec::new();
        backend.handle_discovery(&mut first).unwrap();
        backend.handle_discovery(&mut second).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_run_discovery_with_no_args() {
        let tmp = TempDir::new().unwrap();
        let backend = test_backend(tmp.path());
        assert_eq!(backend.run(&["papersink-backend".to_string()]), EXIT_OK);
    }

    #[test]
    fn test_run_rejects_wrong_arity() {
        let tmp = TempDir::new().unwrap();
        let backend = test_backend(tmp.path());
        let argv: Vec<String> = ["papersink-backend", "7", "alice"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(backend.run(&argv), EXIT_CANCEL);
    }

    #[test]
    fn test_cancelled_job_leaves_no_entry() {
        let tmp = TempDir::new().unwrap();
        let backend = test_backend(tmp.path());
        backend.cancel_flag().store(true, Ordering::Relaxed);

        let job = PrintJob::from_args(&[
            "7".to_string(),
            "alice".to_string(),
            "Report".to_string(),
            "1".to_string(),
            String::new(),
        ])
        .unwrap();

        let mut input: &[u8] = b"%PDF-1.7 payload";
        let mut status = StatusChannel::new(Vec::new());
        let err = backend.handle_job(job, &mut input, &mut status).unwrap_err();
        assert!(matches!(err, BackendError::Payload(PayloadError::Cancelled)));

        let store = SpoolStore::new(tmp.path());
        assert!(store.entries("alice").unwrap().is_empty());
    }
}
