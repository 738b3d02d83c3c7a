//! Error types for SEG-Y and conversion operations

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for SEG-Y operations
#[derive(Error, Debug)]
pub enum SegyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported numeric kind: {0}")]
    UnsupportedNumericKind(String),

    #[error("Unsupported data sample format {format} for SEG-Y revision {revision}")]
    UnsupportedDataSampleFormat { revision: u16, format: i16 },

    #[error("Buffer too short: need {needed} bytes at offset {offset}, buffer holds {len}")]
    BufferTooShort {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Truncated file: {size} bytes do not hold a whole number of {block}-byte trace blocks")]
    TruncatedFile { size: usize, block: usize },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Empty channel: {0}")]
    EmptyChannel(String),

    #[error("Value {value} does not fit in {kind}")]
    ValueOutOfRange { kind: String, value: f64 },

    #[error("Unknown header field: {0}")]
    UnknownField(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid file name: {0}")]
    InvalidFileName(PathBuf),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("No input could be merged")]
    NothingToMerge,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("{path}: {source}")]
    AtPath {
        path: PathBuf,
        #[source]
        source: Box<SegyError>,
    },
}

impl SegyError {
    /// Attach the offending path to this error
    pub fn at(self, path: impl Into<PathBuf>) -> Self {
        match self {
            SegyError::Io(source) => SegyError::IoAt {
                path: path.into(),
                source,
            },
            already @ (SegyError::AtPath { .. } | SegyError::IoAt { .. }) => already,
            other => SegyError::AtPath {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, with any path wrapper removed
    pub fn root(&self) -> &SegyError {
        match self {
            SegyError::AtPath { source, .. } => source.root(),
            other => other,
        }
    }

    /// Path attached to this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            SegyError::AtPath { path, .. } | SegyError::IoAt { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether this error aborts a whole conversion run.
    ///
    /// Unsupported sample formats and bad configuration are configuration
    /// errors, not data anomalies. Everything else is recovered per file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.root(),
            SegyError::UnsupportedDataSampleFormat { .. } | SegyError::Configuration(_)
        )
    }
}

/// Specialized Result type for SEG-Y operations
pub type Result<T> = std::result::Result<T, SegyError>;

impl From<bincode::Error> for SegyError {
    fn from(err: bincode::Error) -> Self {
        SegyError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SegyError {
    fn from(err: serde_json::Error) -> Self {
        SegyError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SegyError {
    fn from(err: tokio::task::JoinError) -> Self {
        SegyError::Worker(err.to_string())
    }
}

impl From<toml::de::Error> for SegyError {
    fn from(err: toml::de::Error) -> Self {
        SegyError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let dsf = SegyError::UnsupportedDataSampleFormat {
            revision: 1,
            format: 99,
        };
        assert!(dsf.is_fatal());
        assert!(dsf.at("/data/a.sgy").is_fatal());

        let empty = SegyError::EmptyChannel("no samples".into());
        assert!(!empty.is_fatal());
    }

    #[test]
    fn test_path_is_attached_once() {
        let err = SegyError::TruncatedFile { size: 10, block: 4 }
            .at("/a.sgy")
            .at("/b.sgy");
        assert_eq!(err.path(), Some(&PathBuf::from("/a.sgy")));
        assert!(matches!(err.root(), SegyError::TruncatedFile { .. }));
    }

    #[test]
    fn test_io_becomes_io_at() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = SegyError::from(io).at("/x.dat");
        assert!(matches!(err, SegyError::IoAt { .. }));
    }
}
