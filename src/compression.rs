//! Snapshot body compression

use crate::error::{Result, SegyError};
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression as FlateCompression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Compression applied to a snapshot body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionMethod {
    None = 0,
    Deflate = 1,
    #[default]
    Zstd = 3,
}

impl CompressionMethod {
    /// Method stored in a snapshot header byte
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionMethod::None),
            1 => Ok(CompressionMethod::Deflate),
            3 => Ok(CompressionMethod::Zstd),
            other => Err(SegyError::Decompression(format!(
                "unknown compression method {}",
                other
            ))),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Deflate => "deflate",
            CompressionMethod::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionMethod {
    type Err = SegyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionMethod::None),
            "deflate" | "zip" => Ok(CompressionMethod::Deflate),
            "zstd" => Ok(CompressionMethod::Zstd),
            other => Err(SegyError::Configuration(format!(
                "unknown compression method {}",
                other
            ))),
        }
    }
}

/// Compression level (0-9, where 0 is no compression and 9 is maximum)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn best() -> Self {
        Self(9)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>>;

    /// `expected_size` is a capacity hint only
    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>>;

    fn method(&self) -> CompressionMethod;
}

#[derive(Debug, Default)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn compress(&self, data: &[u8], _level: CompressionLevel) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], _expected_size: Option<usize>) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::None
    }
}

#[derive(Debug, Default)]
pub struct DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(data, FlateCompression::new(level.value() as u32));
        let mut compressed = Vec::new();
        encoder
            .read_to_end(&mut compressed)
            .map_err(|e| SegyError::Compression(e.to_string()))?;
        Ok(compressed)
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        let mut decoder = DeflateDecoder::new(data);
        let capacity = expected_size.unwrap_or_default().min(data.len().saturating_mul(8));
        let mut decompressed = Vec::with_capacity(capacity);
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| SegyError::Decompression(e.to_string()))?;
        Ok(decompressed)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflate
    }
}

#[derive(Debug, Default)]
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        zstd::encode_all(data, level.value() as i32).map_err(|e| SegyError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], _expected_size: Option<usize>) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| SegyError::Decompression(e.to_string()))
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }
}

pub fn get_compressor(method: CompressionMethod) -> Box<dyn Compressor> {
    match method {
        CompressionMethod::None => Box::new(NoneCompressor),
        CompressionMethod::Deflate => Box::new(DeflateCompressor),
        CompressionMethod::Zstd => Box::new(ZstdCompressor),
    }
}
