//! Ghostscript-backed production converter.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info_span, warn};

use crate::config::BackendConfig;
use crate::error::ConversionError;

use super::{sniff_format, Converter, InputFormat};

/// How often the child is polled while waiting for it to finish.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_CAPTURED_STDERR: usize = 2048;

pub struct GhostscriptConverter {
    command: String,
    timeout: Duration,
}

impl GhostscriptConverter {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(
            config.gs_command.clone(),
            Duration::from_secs(config.convert_timeout_secs),
        )
    }

    fn distill(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let mut child = Command::new(&self.command)
            .arg("-dSAFER")
            .arg("-dNOPAUSE")
            .arg("-dBATCH")
            .arg("-dQUIET")
            .arg("-sDEVICE=pdfwrite")
            .arg(format!("-sOutputFile={}", output.display()))
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConversionError::ToolUnavailable {
                        command: self.command.clone(),
                        source: e,
                    }
                } else {
                    ConversionError::Io(e)
                }
            })?;

        // Drain stderr while the child runs. A tool that fills the pipe
        // buffer would otherwise block on write and never exit, turning a
        // plain failure into a timeout.
        let stderr_pipe = child.stderr.take();
        let stderr_reader = std::thread::spawn(move || {
            let mut captured = String::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut captured);
            }
            captured
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    warn!(command = %self.command, timeout = ?self.timeout, "killing stuck converter");
                    let _ = child.kill();
                    let _ = child.wait();
                    // The kill closed the pipe, so the reader is done.
                    let _ = stderr_reader.join();
                    return Err(ConversionError::Timeout {
                        seconds: self.timeout.as_secs(),
                    });
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        if !status.success() {
            let mut stderr = stderr_reader.join().unwrap_or_default();
            if stderr.len() > MAX_CAPTURED_STDERR {
                let mut end = MAX_CAPTURED_STDERR;
                while !stderr.is_char_boundary(end) {
                    end -= 1;
                }
                stderr.truncate(end);
            }
            return Err(ConversionError::Failed {
                status: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        let _ = stderr_reader.join();
        debug!(output = %output.display(), "distilled PostScript to PDF");
        Ok(())
    }
}

impl Converter for GhostscriptConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let _span = info_span!("convert", command = %self.command).entered();
        match sniff_format(input)? {
            InputFormat::Pdf => {
                // Filters already produced PDF; spool the bytes as-is.
                std::fs::copy(input, output)?;
                debug!(output = %output.display(), "payload already PDF, passed through");
                Ok(())
            }
            InputFormat::PostScript => self.distill(input, output),
            InputFormat::Unknown => Err(ConversionError::Unrecognized),
        }
    }
}
