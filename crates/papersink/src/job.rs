//! Print job model and invocation-argument parsing.
//!
//! The scheduler passes five or six positional arguments:
//! `job-id user title copies options [file]`. When the sixth is absent the
//! document bytes arrive on standard input.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ArgumentError;

/// Where the raw document bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Read from the process's standard input until end-of-stream.
    Stdin,
    /// Already spooled by the scheduler; read from this path.
    File(PathBuf),
}

/// Print options parsed from the scheduler's `key=value` option string.
///
/// Options arrive as whitespace-separated tokens. A token without `=` is a
/// flag and gets the value `true`. Unknown keys are retained, never
/// rejected — new PPD options must not break old backends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions {
    values: HashMap<String, String>,
}

impl JobOptions {
    pub fn parse(raw: &str) -> Self {
        let mut values = HashMap::new();
        for token in raw.split_whitespace() {
            match token.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    values.insert(key.to_string(), value.to_string());
                }
                Some(_) => {} // "=value" tokens are malformed; skip, don't abort
                None => {
                    values.insert(token.to_string(), "true".to_string());
                }
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One print request, alive for the duration of a single backend process.
/// Only its effects (the spooled PDF) outlive the invocation.
#[derive(Debug, Clone)]
pub struct PrintJob {
    /// Opaque identifier assigned by the scheduler.
    pub job_id: String,
    /// OS account that submitted the job; owns the spool entry.
    pub owning_user: String,
    /// Free-text document title. Display only — never trusted for paths.
    pub title: String,
    /// Requested copy count; informational for a virtual printer.
    pub copies: u32,
    pub options: JobOptions,
    pub payload: Payload,
}

impl PrintJob {
    /// Builds a job from the positional arguments (argv without the program
    /// name). Expects exactly 5 or 6 of them, per the backend convention.
    pub fn from_args(args: &[String]) -> Result<Self, ArgumentError> {
        if args.len() != 5 && args.len() != 6 {
            return Err(ArgumentError::Usage { argc: args.len() });
        }

        let job_id = args[0].trim();
        if job_id.is_empty() {
            return Err(ArgumentError::EmptyField { field: "job-id" });
        }

        let owning_user = args[1].trim();
        if owning_user.is_empty() {
            return Err(ArgumentError::EmptyField { field: "user" });
        }
        // User names become spool directory components.
        if owning_user.contains(['/', '\\']) || owning_user == "." || owning_user == ".." {
            return Err(ArgumentError::InvalidUser {
                value: owning_user.to_string(),
            });
        }

        let copies: u32 = args[3]
            .trim()
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ArgumentError::InvalidCopies {
                value: args[3].clone(),
            })?;

        let payload = match args.get(5) {
            Some(path) => Payload::File(PathBuf::from(path)),
            None => Payload::Stdin,
        };

        Ok(Self {
            job_id: job_id.to_string(),
            owning_user: owning_user.to_string(),
            title: args[2].clone(),
            copies,
            options: JobOptions::parse(&args[4]),
            payload,
        })
    }
}
