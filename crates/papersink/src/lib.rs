pub mod backend;
pub mod config;
pub mod convert;
pub mod device;
pub mod error;
pub mod job;
pub mod logging;
pub mod notify;
pub mod sanitize;
pub mod spool;
pub mod status;

pub use backend::{CupsBackend, ProtocolAdapter};
pub use config::{load_config, load_config_from_str, BackendConfig};
pub use convert::{Converter, GhostscriptConverter};
pub use device::DeviceDescriptor;
pub use error::{
    ArgumentError, BackendError, ConfigError, ConversionError, Disposition, NotificationError,
    PayloadError, Result, SpoolError,
};
pub use job::{JobOptions, Payload, PrintJob};
pub use notify::{Mediator, NotifyOutcome};
pub use spool::{SpoolEntry, SpoolStore, WriteHandle};
pub use status::StatusChannel;
