use std::path::PathBuf;
use thiserror::Error;

/// CUPS backend exit codes. The scheduler's retry loop keys off these, so
/// the transient/permanent split here is the most important contract
/// surface of the whole backend.
pub const EXIT_OK: i32 = 0;
/// `CUPS_BACKEND_CANCEL` — permanent failure, the job must not be retried.
pub const EXIT_CANCEL: i32 = 5;
/// `CUPS_BACKEND_RETRY` — transient failure, the scheduler may retry later.
pub const EXIT_RETRY: i32 = 6;

/// How a failure should be reported to the print subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Do not retry: the invocation or payload is broken.
    Permanent,
    /// Retry later: the condition may clear (disk pressure, converter busy).
    Transient,
    /// The job itself succeeded; report on the status channel only.
    NonFatal,
}

impl Disposition {
    pub fn exit_code(self) -> i32 {
        match self {
            Disposition::Permanent => EXIT_CANCEL,
            Disposition::Transient => EXIT_RETRY,
            Disposition::NonFatal => EXIT_OK,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum ArgumentError {
    #[error("Usage: papersink-backend job-id user title copies options [file]")]
    Usage { argc: usize },

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("Invalid user name '{value}'")]
    InvalidUser { value: String },

    #[error("Copies must be a positive integer, got '{value}'")]
    InvalidCopies { value: String },
}

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Failed to read print data from stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("Failed to read input file '{path}': {source}")]
    InputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Print job cancelled")]
    Cancelled,
}

impl PayloadError {
    fn disposition(&self) -> Disposition {
        match self {
            // A vanished or unreadable spool file will not reappear.
            PayloadError::InputFile { .. } | PayloadError::Cancelled => Disposition::Permanent,
            PayloadError::Stdin(_) => Disposition::Permanent,
        }
    }
}

#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("Failed to create spool directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open spool file '{path}': {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write spool file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to commit spool file '{from}' to '{to}': {source}")]
    Commit {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list spool directory '{path}': {source}")]
    ListDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove spool entry '{path}': {source}")]
    RemoveEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpoolError {
    fn io_source(&self) -> &std::io::Error {
        match self {
            SpoolError::CreateDirectory { source, .. }
            | SpoolError::OpenFile { source, .. }
            | SpoolError::WriteFile { source, .. }
            | SpoolError::Commit { source, .. }
            | SpoolError::ListDirectory { source, .. }
            | SpoolError::RemoveEntry { source, .. } => source,
        }
    }

    fn disposition(&self) -> Disposition {
        // Disk pressure clears; revoked permissions do not.
        if self.io_source().kind() == std::io::ErrorKind::PermissionDenied {
            Disposition::Permanent
        } else {
            Disposition::Transient
        }
    }
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Converter '{command}' is not available: {source}")]
    ToolUnavailable {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Converter exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("Input is not a recognizable document")]
    Unrecognized,

    #[error("I/O error during conversion: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    fn disposition(&self) -> Disposition {
        match self {
            ConversionError::ToolUnavailable { .. }
            | ConversionError::Timeout { .. }
            | ConversionError::Io(_) => Disposition::Transient,
            ConversionError::Failed { .. } | ConversionError::Unrecognized => {
                Disposition::Permanent
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("No combiner instance reachable at '{path}': {source}")]
    SocketUnreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch combiner '{command}': {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to record pending job: {0}")]
    PendingFile(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Invalid invocation: {0}")]
    Argument(#[from] ArgumentError),

    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    #[error("Spool error: {0}")]
    Spool(#[from] SpoolError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BackendError {
    pub fn disposition(&self) -> Disposition {
        match self {
            BackendError::Argument(_) => Disposition::Permanent,
            BackendError::Payload(e) => e.disposition(),
            BackendError::Spool(e) => e.disposition(),
            BackendError::Conversion(e) => e.disposition(),
            BackendError::Notification(_) => Disposition::NonFatal,
            // Misconfiguration will not fix itself between retries.
            BackendError::Config(_) => Disposition::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_errors_are_permanent() {
        let err = BackendError::from(ArgumentError::InvalidCopies {
            value: "-3".to_string(),
        });
        assert_eq!(err.disposition(), Disposition::Permanent);
        assert_eq!(err.disposition().exit_code(), EXIT_CANCEL);
    }

    #[test]
    fn conversion_timeout_is_transient() {
        let err = BackendError::from(ConversionError::Timeout { seconds: 30 });
        assert_eq!(err.disposition(), Disposition::Transient);
        assert_eq!(err.disposition().exit_code(), EXIT_RETRY);
    }

    #[test]
    fn unrecognizable_input_is_permanent() {
        let err = BackendError::from(ConversionError::Unrecognized);
        assert_eq!(err.disposition(), Disposition::Permanent);
    }

    #[test]
    fn spool_permission_denied_is_permanent() {
        let err = BackendError::from(SpoolError::WriteFile {
            path: PathBuf::from("/spool/x"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(err.disposition(), Disposition::Permanent);
    }

    #[test]
    fn spool_disk_error_is_transient() {
        let err = BackendError::from(SpoolError::WriteFile {
            path: PathBuf::from("/spool/x"),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(err.disposition(), Disposition::Transient);
    }

    #[test]
    fn notification_failures_never_fail_the_job() {
        let err = BackendError::from(NotificationError::PendingFile(std::io::Error::other(
            "unwritable",
        )));
        assert_eq!(err.disposition(), Disposition::NonFatal);
        assert_eq!(err.disposition().exit_code(), EXIT_OK);
    }
}
