//! Utility functions

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};

/// Extension of written SEG-Y files
pub const SEGY_EXTENSION: &str = "sgy";

/// Calculate checksum (CRC32) for data
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFFu32;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}

/// Verify checksum
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    calculate_checksum(data) == expected
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// 1-based day of the year
pub fn day_of_year(date: NaiveDate) -> u32 {
    date.ordinal()
}

/// Parse a `YYYYMMDD` folder name
pub fn parse_date_folder(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(name, "%Y%m%d").ok()
}

/// `YYYYMMDD_HHMMSS.sgy`
pub fn output_file_name(at: NaiveDateTime) -> String {
    format!("{}.{}", at.format("%Y%m%d_%H%M%S"), SEGY_EXTENSION)
}

/// Output path for a bucket starting at `at`
pub fn output_path(dir: &Path, at: NaiveDateTime) -> PathBuf {
    dir.join(output_file_name(at))
}

/// Sorted names of the entries of `dir` matching `keep`
pub fn sorted_entries<F>(dir: &Path, keep: F) -> std::io::Result<Vec<(String, PathBuf)>>
where
    F: Fn(&Path) -> bool,
{
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !keep(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            entries.push((name.to_string(), path.clone()));
        }
    }
    entries.sort();
    Ok(entries)
}
