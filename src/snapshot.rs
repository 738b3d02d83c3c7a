//! Compressed binary snapshots of a [`SegyContainer`]
//!
//! A snapshot keeps the full-precision `f64` matrix and every header column,
//! which a SEG-Y file written as 32-bit samples cannot. Layout:
//!
//! ```text
//! magic "SGYC" | major u16 | minor u16 | method u8 | level u8 | reserved u16
//! | body length u64 | CRC32 of the uncompressed body u32 | compressed body
//! ```
//!
//! All header integers are big-endian. The body is bincode.

use crate::compression::{get_compressor, CompressionLevel, CompressionMethod};
use crate::container::SegyContainer;
use crate::error::{Result, SegyError};
use crate::header::{TraceHeaderTable, VolumeHeader};
use crate::segy::write_atomic;
use crate::utils::calculate_checksum;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const MAGIC: &[u8; 4] = b"SGYC";
pub const HEADER_BYTES: usize = 24;
/// Largest uncompressed body a snapshot header may declare
pub const MAX_BODY_BYTES: u64 = 1 << 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVersion {
    pub major: u16,
    pub minor: u16,
}

impl SnapshotVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for SnapshotVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Fixed-size leading header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub version: SnapshotVersion,
    pub compression: CompressionMethod,
    pub level: CompressionLevel,
    pub body_len: u64,
    pub checksum: u32,
}

impl SnapshotHeader {
    fn encode(&self, out: &mut BytesMut) {
        out.put_slice(MAGIC);
        out.put_u16(self.version.major);
        out.put_u16(self.version.minor);
        out.put_u8(self.compression.as_u8());
        out.put_u8(self.level.value());
        out.put_u16(0);
        out.put_u64(self.body_len);
        out.put_u32(self.checksum);
    }

    /// Parse and check the leading header of a snapshot
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_BYTES {
            return Err(SegyError::BufferTooShort {
                offset: 0,
                needed: HEADER_BYTES,
                len: bytes.len(),
            });
        }
        let mut buf = &bytes[..HEADER_BYTES];
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(SegyError::Serialization("not a container snapshot".to_string()));
        }
        let version = SnapshotVersion::new(buf.get_u16(), buf.get_u16());
        if !SnapshotVersion::CURRENT.is_compatible(&version) {
            return Err(SegyError::Serialization(format!(
                "snapshot version {}.{} is not readable by {}.{}",
                version.major,
                version.minor,
                SnapshotVersion::CURRENT.major,
                SnapshotVersion::CURRENT.minor
            )));
        }
        let compression = CompressionMethod::from_u8(buf.get_u8())?;
        let level = CompressionLevel::new(buf.get_u8());
        buf.advance(2);
        Ok(Self {
            version,
            compression,
            level,
            body_len: buf.get_u64(),
            checksum: buf.get_u32(),
        })
    }
}

#[derive(Serialize)]
struct BodyRef<'a> {
    created_at: DateTime<Utc>,
    volume: &'a VolumeHeader,
    headers: &'a TraceHeaderTable,
    traces: &'a Array2<f64>,
}

#[derive(Deserialize)]
struct Body {
    created_at: DateTime<Utc>,
    volume: VolumeHeader,
    headers: TraceHeaderTable,
    traces: Array2<f64>,
}

/// Serialize `container` into a snapshot
pub fn to_bytes(container: &SegyContainer, method: CompressionMethod, level: CompressionLevel) -> Result<Bytes> {
    let body = bincode::serialize(&BodyRef {
        created_at: Utc::now(),
        volume: container.volume_header(),
        headers: container.trace_header(),
        traces: container.traces(),
    })?;
    let compressed = get_compressor(method).compress(&body, level)?;
    debug!(
        method = %method,
        raw = body.len(),
        compressed = compressed.len(),
        "Encoded snapshot"
    );

    let header = SnapshotHeader {
        version: SnapshotVersion::CURRENT,
        compression: method,
        level,
        body_len: body.len() as u64,
        checksum: calculate_checksum(&body),
    };
    let mut out = BytesMut::with_capacity(HEADER_BYTES + compressed.len());
    header.encode(&mut out);
    out.put_slice(&compressed);
    Ok(out.freeze())
}

/// Restore a container, verifying the body checksum
pub fn from_bytes(bytes: &[u8]) -> Result<SegyContainer> {
    let header = SnapshotHeader::decode(bytes)?;
    if header.body_len > MAX_BODY_BYTES {
        return Err(SegyError::Decompression(format!(
            "header declares a {} byte body, limit is {}",
            header.body_len, MAX_BODY_BYTES
        )));
    }
    let compressed = &bytes[HEADER_BYTES..];
    let hint = usize::try_from(header.body_len)
        .unwrap_or(usize::MAX)
        .min(compressed.len().saturating_mul(8));
    let body = get_compressor(header.compression).decompress(compressed, Some(hint))?;
    if body.len() as u64 != header.body_len {
        return Err(SegyError::Decompression(format!(
            "body is {} bytes, header says {}",
            body.len(),
            header.body_len
        )));
    }
    let actual = calculate_checksum(&body);
    if actual != header.checksum {
        return Err(SegyError::Decompression(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            header.checksum, actual
        )));
    }
    let body: Body = bincode::deserialize(&body)?;
    debug!(created_at = %body.created_at, "Decoded snapshot");
    SegyContainer::new(body.traces, body.volume, body.headers)
}

/// Write a snapshot atomically
pub fn save(
    container: &SegyContainer,
    path: impl AsRef<Path>,
    method: CompressionMethod,
    level: CompressionLevel,
) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_bytes(container, method, level)?;
    write_atomic(path, &bytes)
}

pub fn load(path: impl AsRef<Path>) -> Result<SegyContainer> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| SegyError::from(e).at(path))?;
    from_bytes(&bytes).map_err(|e| e.at(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ComponentMode, ComponentOrder};
    use tempfile::TempDir;

    fn container() -> SegyContainer {
        let data = Array2::from_shape_fn((200, 6), |(i, j)| (i as f64 * 0.37).sin() + j as f64 / 3.0);
        let mut c = SegyContainer::from_traces(data, 500).unwrap();
        c.set_trace_identification_code(ComponentMode::Three, ComponentOrder::Zen)
            .unwrap();
        c.set_trace_column("Inline3D", vec![4101, 4101, 4101, 4102, 4102, 4102])
            .unwrap();
        c
    }

    #[test]
    fn test_snapshot_keeps_full_precision() {
        let original = container();
        for method in [CompressionMethod::None, CompressionMethod::Deflate, CompressionMethod::Zstd] {
            let bytes = to_bytes(&original, method, CompressionLevel::fast()).unwrap();
            let restored = from_bytes(&bytes).unwrap();
            assert_eq!(restored, original, "{}", method);
            assert_eq!(restored.component_order(), ComponentOrder::Zen);
        }
    }

    #[test]
    fn test_header_fields() {
        let bytes = to_bytes(&container(), CompressionMethod::Zstd, CompressionLevel::default()).unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        let header = SnapshotHeader::decode(&bytes).unwrap();
        assert_eq!(header.version, SnapshotVersion::CURRENT);
        assert_eq!(header.compression, CompressionMethod::Zstd);
        assert_eq!(header.level.value(), 6);
    }

    #[test]
    fn test_rejects_corruption() {
        let mut bytes = to_bytes(&container(), CompressionMethod::None, CompressionLevel::default())
            .unwrap()
            .to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        assert!(matches!(from_bytes(&bytes), Err(SegyError::Decompression(_))));

        let mut wrong_major = to_bytes(&container(), CompressionMethod::None, CompressionLevel::default())
            .unwrap()
            .to_vec();
        wrong_major[4..6].copy_from_slice(&2u16.to_be_bytes());
        assert!(matches!(from_bytes(&wrong_major), Err(SegyError::Serialization(_))));

        assert!(from_bytes(b"SEGY").is_err());
    }

    #[test]
    fn test_rejects_oversized_body_length() {
        for method in [CompressionMethod::None, CompressionMethod::Deflate, CompressionMethod::Zstd] {
            let mut bytes = to_bytes(&container(), method, CompressionLevel::fast()).unwrap().to_vec();
            bytes[12..20].copy_from_slice(&u64::MAX.to_be_bytes());
            assert!(matches!(from_bytes(&bytes), Err(SegyError::Decompression(_))), "{}", method);

            // within the limit but far beyond what the body holds
            bytes[12..20].copy_from_slice(&(MAX_BODY_BYTES - 1).to_be_bytes());
            assert!(matches!(from_bytes(&bytes), Err(SegyError::Decompression(_))), "{}", method);
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("window.sgyc");
        save(&container(), &path, CompressionMethod::Deflate, CompressionLevel::best()).unwrap();
        assert_eq!(load(&path).unwrap(), container());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
