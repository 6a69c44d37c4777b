//! Virtual device descriptors and the discovery responder.
//!
//! When the scheduler runs the backend with no arguments it expects one
//! line per device on standard output, then a clean exit. This path must be
//! deterministic and must not touch the spool or the converter.

use std::io::Write;

/// Static description of one advertised virtual printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Device URI scheme, e.g. `papersink`.
    pub scheme: &'static str,
    /// Human-readable make-and-model string.
    pub display_name: &'static str,
    /// IEEE-1284-style device info string.
    pub info_string: &'static str,
}

impl DeviceDescriptor {
    /// Formats the descriptor as one discovery line:
    /// `<scheme> "Unknown" "<display_name>" "<info_string>"`.
    pub fn discovery_line(&self) -> String {
        format!(
            "{} \"Unknown\" \"{}\" \"{}\"",
            self.scheme, self.display_name, self.info_string
        )
    }
}

/// The fixed set of devices this backend advertises.
pub fn default_devices() -> &'static [DeviceDescriptor] {
    const DEVICES: &[DeviceDescriptor] = &[DeviceDescriptor {
        scheme: "papersink",
        display_name: "Papersink PDF",
        info_string: "MFG:Papersink;MDL:Virtual PDF;DES:Virtual PDF Printer;",
    }];
    DEVICES
}

/// Writes one discovery line per device.
pub fn write_discovery<W: Write>(devices: &[DeviceDescriptor], out: &mut W) -> std::io::Result<()> {
    for device in devices {
        writeln!(out, "{}", device.discovery_line())?;
    }
    out.flush()
}
