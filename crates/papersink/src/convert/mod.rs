//! The conversion adapter: a narrow seam over whatever turns a raw print
//! payload into canonical PDF.
//!
//! CUPS filters normally hand the backend finished PDF already, so the
//! common case is a pass-through; PostScript payloads are distilled by an
//! external tool. The adapter treats that tool as untrusted: every run is
//! bounded by a timeout and killed on expiry.

mod ghostscript;

pub use ghostscript::GhostscriptConverter;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::ConversionError;

/// Converts the document at `input` into a PDF at `output`. `output` does
/// not exist beforehand and lives in the same directory as the final spool
/// name (the caller owns the atomic publish step).
pub trait Converter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}

/// Payload formats the backend can recognize from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Pdf,
    PostScript,
    Unknown,
}

/// Sniffs the payload header. `%PDF-` marks PDF, `%!` marks PostScript;
/// anything else is unconvertible for a print payload.
pub fn sniff_format(path: &Path) -> Result<InputFormat, ConversionError> {
    let mut header = [0u8; 5];
    let mut file = File::open(path)?;
    let read = read_up_to(&mut file, &mut header)?;
    Ok(classify_header(&header[..read]))
}

fn classify_header(header: &[u8]) -> InputFormat {
    if header.starts_with(b"%PDF-") {
        InputFormat::Pdf
    } else if header.starts_with(b"%!") {
        InputFormat::PostScript
    } else {
        InputFormat::Unknown
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize, ConversionError> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
