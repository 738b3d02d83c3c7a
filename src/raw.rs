//! Raw geophone `.dat` recordings
//!
//! Two layouts are handled. Three-component minute files hold a fixed-size
//! header followed by samples interleaved round-robin across the three
//! channels (file order Y, X, Z). Single-channel time-lapse files hold a
//! 2048-byte header followed by one channel, the channel being named by a
//! `chNN` token in the file name.

use crate::codec;
use crate::error::{Result, SegyError};
use crate::types::{Endian, NumericKind};
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use ndarray::Array2;
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Components per receiver
pub const COMPONENTS: usize = 3;

/// Column of each component in a decoded three-component block
pub const COLUMN_Y: usize = 0;
pub const COLUMN_X: usize = 1;
pub const COLUMN_Z: usize = 2;

/// Bytes of the recorder header needed to parse [`RawHeader`]
pub const RAW_HEADER_BYTES: usize = 96;

/// Samples that fit after `header_skip` bytes of a `size`-byte file
pub fn sample_count(size: u64, header_skip: usize, bytes_per_sample: usize) -> usize {
    if bytes_per_sample == 0 {
        return 0;
    }
    (size.saturating_sub(header_skip as u64) / bytes_per_sample as u64) as usize
}

/// Two's-complement fix-up for signed bytes decoded as unsigned
pub fn fix_signed_bytes(samples: &mut Array2<f64>) {
    samples.mapv_inplace(|v| if v >= 128.0 { v - 256.0 } else { v });
}

/// Deinterleave a three-component buffer into a `(samples, 3)` array of Y, X, Z columns
pub fn decode_raw(buf: &[u8], header_skip: usize, kind: NumericKind, endian: Endian) -> Result<Array2<f64>> {
    let bps = kind.size_in_bytes();
    let per_component = sample_count(buf.len() as u64, header_skip, bps) / COMPONENTS;
    if per_component == 0 {
        return Err(SegyError::EmptyChannel(format!(
            "{} bytes after a {}-byte header hold no {} samples",
            buf.len().saturating_sub(header_skip),
            header_skip,
            kind
        )));
    }

    let read_kind = match kind {
        NumericKind::Int8 => NumericKind::UInt8,
        other => other,
    };
    let mut flat = vec![0.0f64; per_component * COMPONENTS];
    codec::decode_f64_into(buf, header_skip, read_kind, endian, &mut flat)?;

    let mut columns = Array2::from_shape_vec((per_component, COMPONENTS), flat)
        .map_err(|e| SegyError::ShapeMismatch(e.to_string()))?;
    if kind == NumericKind::Int8 {
        fix_signed_bytes(&mut columns);
    }
    Ok(columns)
}

/// Read `count` samples of a single-channel file starting `offset` samples after the header
pub fn read_channel(
    buf: &[u8],
    header_skip: usize,
    kind: NumericKind,
    endian: Endian,
    offset: usize,
    count: usize,
) -> Result<Vec<f64>> {
    let mut samples = vec![0.0f64; count];
    let start = header_skip + offset * kind.size_in_bytes();
    codec::decode_f64_into(buf, start, kind, endian, &mut samples)?;
    Ok(samples)
}

/// Load a whole recording
pub fn load(path: &Path) -> Result<Bytes> {
    let data = std::fs::read(path).map_err(|e| SegyError::from(e).at(path))?;
    Ok(Bytes::from(data))
}

/// Leading recorder header, little-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub day: i16,
    pub month: i16,
    pub year: i16,
    pub hour: i16,
    pub minute: i16,
    pub second: u8,
    pub serial: i16,
    pub samples_per_second: i16,
}

impl RawHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let short = |offset| -> Result<i16> {
            Ok(codec::decode_scalar(buf, offset, NumericKind::Int16, Endian::Little)?.as_i64() as i16)
        };
        Ok(Self {
            day: short(0)?,
            month: short(2)?,
            year: short(4)?,
            hour: short(6)?,
            minute: short(8)?,
            second: codec::decode_scalar(buf, 30, NumericKind::UInt8, Endian::Little)?.as_i64() as u8,
            serial: short(92)?,
            samples_per_second: short(94)?,
        })
    }

    /// Two-digit years are taken as 20xx
    pub fn started_at(&self) -> Result<NaiveDateTime> {
        let year = if (0..100).contains(&self.year) {
            2000 + self.year as i32
        } else {
            self.year as i32
        };
        let invalid = || {
            SegyError::InvalidTimestamp(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, self.month, self.day, self.hour, self.minute, self.second
            ))
        };
        let month = u32::try_from(self.month).map_err(|_| invalid())?;
        let day = u32::try_from(self.day).map_err(|_| invalid())?;
        let hour = u32::try_from(self.hour).map_err(|_| invalid())?;
        let minute = u32::try_from(self.minute).map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, self.second as u32))
            .ok_or_else(invalid)
    }

    /// Sample interval in microseconds, when the header records a rate
    pub fn sample_interval_us(&self) -> Option<u32> {
        match self.samples_per_second {
            sps if sps > 0 => Some(1_000_000 / sps as u32),
            _ => None,
        }
    }
}

/// Physical channel of a single-channel recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// `ch01`
    Z,
    /// `ch02`
    X,
    /// `ch03`
    Y,
}

impl Channel {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Channel::Z),
            2 => Some(Channel::X),
            3 => Some(Channel::Y),
            _ => None,
        }
    }

    pub fn index(&self) -> u8 {
        match self {
            Channel::Z => 1,
            Channel::X => 2,
            Channel::Y => 3,
        }
    }
}

const TIMESTAMP_PATTERN: &str = r"(?:^|_)(\d{8})_?(\d{6})(?:_|$)";
const CHANNEL_PATTERN: &str = r"(?i)(?:^|_)ch(\d{2})(?:_|$)";

type PatternCell = OnceLock<std::result::Result<Regex, regex::Error>>;

fn compiled(cell: &'static PatternCell, pattern: &str) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| SegyError::Configuration(format!("file name pattern {:?}: {}", pattern, e)))
}

fn timestamp_pattern() -> Result<&'static Regex> {
    static PATTERN: PatternCell = OnceLock::new();
    compiled(&PATTERN, TIMESTAMP_PATTERN)
}

fn channel_pattern() -> Result<&'static Regex> {
    static PATTERN: PatternCell = OnceLock::new();
    compiled(&PATTERN, CHANNEL_PATTERN)
}

/// Start time embedded in a file stem as `YYYYMMDD_HHMMSS` or `YYYYMMDDHHMMSS`
pub fn parse_timestamp(stem: &str) -> Result<Option<NaiveDateTime>> {
    let Some(captures) = timestamp_pattern()?.captures(stem) else {
        return Ok(None);
    };
    let joined = format!("{}{}", &captures[1], &captures[2]);
    Ok(NaiveDateTime::parse_from_str(&joined, "%Y%m%d%H%M%S").ok())
}

/// A single-channel time-lapse recording identified from its path
#[derive(Debug, Clone, PartialEq)]
pub struct RawChannelFile {
    pub path: PathBuf,
    /// First `_`-separated token of the file name
    pub receiver: String,
    pub receiver_id: i64,
    pub channel: Channel,
    pub started_at: NaiveDateTime,
    pub size: u64,
}

impl RawChannelFile {
    /// Identify a file from its name, falling back to the recorder header for the start time
    pub fn from_path(path: &Path) -> Result<Self> {
        let invalid = || SegyError::InvalidFileName(path.to_path_buf());
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(invalid)?;

        let receiver = stem.split('_').next().unwrap_or_default().to_string();
        let receiver_id = receiver
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v as i64)
            .ok_or_else(invalid)?;

        let channel = channel_pattern()?
            .captures(stem)
            .and_then(|c| c[1].parse::<u8>().ok())
            .and_then(Channel::from_index)
            .ok_or_else(invalid)?;

        let size = std::fs::metadata(path)
            .map_err(|e| SegyError::from(e).at(path))?
            .len();

        let started_at = match parse_timestamp(stem)? {
            Some(at) => at,
            None => {
                let mut head = Vec::with_capacity(RAW_HEADER_BYTES);
                std::fs::File::open(path)
                    .and_then(|f| f.take(RAW_HEADER_BYTES as u64).read_to_end(&mut head))
                    .map_err(|e| SegyError::from(e).at(path))?;
                RawHeader::parse(&head)
                    .and_then(|h| h.started_at())
                    .map_err(|e| e.at(path))?
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            receiver,
            receiver_id,
            channel,
            started_at,
            size,
        })
    }

    /// Samples after `header_skip` bytes
    pub fn sample_count(&self, header_skip: usize, bytes_per_sample: usize) -> usize {
        sample_count(self.size, header_skip, bytes_per_sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn le_i32(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_deinterleave() {
        // y0 x0 z0 y1 x1 z1
        let buf = le_i32(&[1, 2, 3, 4, 5, 6]);
        let columns = decode_raw(&buf, 0, NumericKind::Int32, Endian::Little).unwrap();
        assert_eq!(columns.dim(), (2, 3));
        assert_eq!(columns.column(COLUMN_Y).to_vec(), vec![1.0, 4.0]);
        assert_eq!(columns.column(COLUMN_X).to_vec(), vec![2.0, 5.0]);
        assert_eq!(columns.column(COLUMN_Z).to_vec(), vec![3.0, 6.0]);
    }

    #[test]
    fn test_header_skip_and_partial_group() {
        let mut buf = vec![0xAA; 8];
        buf.extend(le_i32(&[-1, -2, -3, 7, 8, 9, 10]));
        let columns = decode_raw(&buf, 8, NumericKind::Int32, Endian::Little).unwrap();
        assert_eq!(columns.dim(), (2, 3));
        assert_eq!(columns[[0, COLUMN_Z]], -3.0);
        assert_eq!(columns[[1, COLUMN_Y]], 7.0);
    }

    #[test]
    fn test_empty_channel() {
        let buf = vec![0u8; 520];
        let err = decode_raw(&buf, 512, NumericKind::Int32, Endian::Little).unwrap_err();
        assert!(matches!(err, SegyError::EmptyChannel(_)));
        let err = decode_raw(&[], 512, NumericKind::Int32, Endian::Little).unwrap_err();
        assert!(matches!(err, SegyError::EmptyChannel(_)));
    }

    #[test]
    fn test_signed_byte_fixup() {
        let columns = decode_raw(&[0x7f, 0x80, 0xff], 0, NumericKind::Int8, Endian::Little).unwrap();
        assert_eq!(columns.row(0).to_vec(), vec![127.0, -128.0, -1.0]);
    }

    #[test]
    fn test_read_channel_offset() {
        let mut buf = vec![0u8; 16];
        buf.extend(le_i32(&[10, 20, 30, 40, 50]));
        assert_eq!(
            read_channel(&buf, 16, NumericKind::Int32, Endian::Little, 2, 3).unwrap(),
            vec![30.0, 40.0, 50.0]
        );
        assert!(read_channel(&buf, 16, NumericKind::Int32, Endian::Little, 3, 3).is_err());
    }

    #[test]
    fn test_raw_header() {
        let mut buf = vec![0u8; RAW_HEADER_BYTES];
        buf[0..2].copy_from_slice(&21i16.to_le_bytes());
        buf[2..4].copy_from_slice(&4i16.to_le_bytes());
        buf[4..6].copy_from_slice(&2020i16.to_le_bytes());
        buf[6..8].copy_from_slice(&19i16.to_le_bytes());
        buf[8..10].copy_from_slice(&4i16.to_le_bytes());
        buf[30] = 12;
        buf[94..96].copy_from_slice(&1000i16.to_le_bytes());
        let header = RawHeader::parse(&buf).unwrap();
        let expected = NaiveDate::from_ymd_opt(2020, 4, 21)
            .unwrap()
            .and_hms_opt(19, 4, 12)
            .unwrap();
        assert_eq!(header.started_at().unwrap(), expected);
        assert_eq!(header.sample_interval_us(), Some(1000));
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = NaiveDate::from_ymd_opt(2018, 12, 1)
            .unwrap()
            .and_hms_opt(10, 30, 5)
            .unwrap();
        assert_eq!(parse_timestamp("101_A_20181201_103005_ch01").unwrap(), Some(expected));
        assert_eq!(parse_timestamp("101_20181201103005_ch02").unwrap(), Some(expected));
        assert_eq!(parse_timestamp("101_ch02").unwrap(), None);
    }

    #[test]
    fn test_name_patterns_compile() {
        let stamp = timestamp_pattern().unwrap();
        assert!(stamp.is_match("5_geo_20181201_080000_ch01"));
        assert!(!stamp.is_match("5_geo_2018120_080000_ch01"));
        let channel = channel_pattern().unwrap();
        assert_eq!(&channel.captures("5_geo_CH02").unwrap()[1], "02");
        assert!(channel.captures("5_geo_ch2").is_none());
    }

    #[test]
    fn test_channel_file_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("4101_G_20181201_103005_ch03.dat");
        std::fs::write(&path, vec![0u8; 2048 + 40]).unwrap();
        let file = RawChannelFile::from_path(&path).unwrap();
        assert_eq!(file.receiver_id, 4101);
        assert_eq!(file.channel, Channel::Y);
        assert_eq!(file.size, 2088);
        assert_eq!(file.sample_count(2048, 4), 10);

        let bad = dir.path().join("station_ch01.dat");
        std::fs::write(&bad, b"").unwrap();
        assert!(matches!(
            RawChannelFile::from_path(&bad),
            Err(SegyError::InvalidFileName(_))
        ));
    }

    #[test]
    fn test_channel_file_header_fallback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("4102_ch01.dat");
        let mut buf = vec![0u8; 2048];
        buf[0..2].copy_from_slice(&1i16.to_le_bytes());
        buf[2..4].copy_from_slice(&12i16.to_le_bytes());
        buf[4..6].copy_from_slice(&18i16.to_le_bytes());
        std::fs::write(&path, buf).unwrap();
        let file = RawChannelFile::from_path(&path).unwrap();
        assert_eq!(
            file.started_at,
            NaiveDate::from_ymd_opt(2018, 12, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
    }
}
