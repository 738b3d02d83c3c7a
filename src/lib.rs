//! segyconv - SEG-Y codec and geophone recording conversion
//!
//! Reads and writes SEG-Y Rev 0/Rev 1 files into an in-memory
//! [`SegyContainer`] (trace matrix plus binary and trace headers), and
//! converts multi-channel geophone `.dat` recordings into SEG-Y.
//!
//! # Features
//!
//! - Table-driven binary and trace header schemas
//! - IBM float, 8/16/32-bit integer and IEEE float samples
//! - Three-component order detection (ZEN, ENZ, grouped)
//! - Minute-bucket and time-lapse conversion strategies with cancellation
//! - Compressed full-precision container snapshots
//!
//! # Example
//!
//! ```rust,no_run
//! use segyconv::segy::{self, ReadOptions, WriteOptions};
//!
//! # fn example() -> segyconv::Result<()> {
//! let container = segy::read_file("/data/20191111_100500.sgy", &ReadOptions::default())?;
//! println!("{}", container.stats());
//!
//! let z = container.z_traces();
//! println!("{} vertical traces", z.ncols());
//!
//! segy::write_file(&container, "/data/copy.sgy", &WriteOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod compression;
pub mod config;
pub mod container;
pub mod error;
pub mod header;
pub mod pipeline;
pub mod raw;
pub mod schema;
pub mod segy;
pub mod snapshot;
pub mod types;
pub mod utils;

// Re-exports
pub use compression::{CompressionLevel, CompressionMethod, Compressor};
pub use config::{ConvertConfig, WindowPolicy};
pub use container::{ComponentMode, ComponentOrder, ContainerStats, SegyContainer, TimeBase};
pub use error::{Result, SegyError};
pub use header::{TraceHeaderTable, VolumeHeader};
pub use pipeline::{CancelToken, ConversionWorker, RunReport, Strategy, WorkerEvent, WorkerStatus};
pub use schema::{trace_schema, volume_schema, FieldDescriptor, HeaderSchema};
pub use segy::{ReadOptions, WriteOptions};
pub use types::{Endian, NumericKind, Value};

/// Version of the segyconv implementation
pub const SEGYCONV_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!SEGYCONV_VERSION.is_empty());
    }
}
