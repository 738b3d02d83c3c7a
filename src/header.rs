//! Volume header value map and columnar trace header table

use crate::error::{Result, SegyError};
use crate::schema::{self, trace_schema, volume_schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Derived key holding the trace count; not stored on disk
pub const NTRACES: &str = "ntraces";

/// FieldRecord value used for freshly assembled traces
pub const DEFAULT_FIELD_RECORD: i64 = 1000;

/// Values of the binary volume header plus the derived `ntraces` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeHeader {
    values: BTreeMap<String, i64>,
}

impl Default for VolumeHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeHeader {
    /// Every scalar volume field at its schema default, `ntraces = 0`
    pub fn new() -> Self {
        let mut values: BTreeMap<String, i64> = volume_schema()
            .scalar_fields()
            .map(|f| (f.name.to_string(), f.default))
            .collect();
        values.insert(NTRACES.to_string(), 0);
        Self { values }
    }

    /// Header for `ntraces` IEEE float traces of `ns` samples at `dt` microseconds
    pub fn with_defaults(ntraces: usize, ns: usize, dt: u32) -> Self {
        let mut header = Self::new();
        header.values.insert(NTRACES.to_string(), ntraces as i64);
        header.values.insert("ns".to_string(), ns as i64);
        header.values.insert("dt".to_string(), dt as i64);
        header.values.insert("DataSampleFormat".to_string(), 5);
        header.values.insert("SegyFormatRevisionNumber".to_string(), 100);
        header
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    /// Set a schema field or `ntraces`
    pub fn set(&mut self, name: &str, value: i64) -> Result<()> {
        if name != NTRACES {
            let field = volume_schema().field(name)?;
            if !field.is_scalar() {
                return Err(SegyError::UnknownField(format!("{} is padding", name)));
            }
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn ntraces(&self) -> usize {
        self.get(NTRACES).unwrap_or(0).max(0) as usize
    }

    pub fn ns(&self) -> usize {
        self.get("ns").unwrap_or(0).max(0) as usize
    }

    /// Sample interval in microseconds
    pub fn dt(&self) -> u32 {
        self.get("dt").unwrap_or(0).clamp(0, u32::MAX as i64) as u32
    }

    pub fn data_sample_format(&self) -> i16 {
        self.get("DataSampleFormat").unwrap_or(0) as i16
    }

    /// Revision number as stored (0, 1, 100 or 256 in practice)
    pub fn revision_raw(&self) -> u16 {
        self.get("SegyFormatRevisionNumber").unwrap_or(0) as u16
    }

    /// Revision normalized to 0 or 1
    pub fn revision(&self) -> Option<u16> {
        schema::normalize_revision(self.revision_raw())
    }

    /// Bytes per sample for the stored revision and format
    pub fn bytes_per_sample(&self) -> Result<usize> {
        schema::bytes_per_sample(self.revision_raw(), self.data_sample_format())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub(crate) fn set_ntraces(&mut self, ntraces: usize) {
        self.values.insert(NTRACES.to_string(), ntraces as i64);
    }
}

/// Per-trace header values stored column by column.
///
/// Every column holds exactly `ntraces` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceHeaderTable {
    ntraces: usize,
    columns: BTreeMap<String, Vec<i64>>,
}

impl TraceHeaderTable {
    /// Every scalar trace field filled with its schema default
    pub fn new(ntraces: usize) -> Self {
        let columns = trace_schema()
            .scalar_fields()
            .map(|f| (f.name.to_string(), vec![f.default; ntraces]))
            .collect();
        Self { ntraces, columns }
    }

    /// Sequence numbers 1..=n, FieldRecord 1000, plus `ns` and `dt` on every trace
    pub fn with_defaults(ntraces: usize, ns: usize, dt: u32) -> Self {
        let mut table = Self::new(ntraces);
        let sequence: Vec<i64> = (1..=ntraces as i64).collect();
        for name in ["TraceSequenceLine", "TraceSequenceFile", "TraceNumber"] {
            table.columns.insert(name.to_string(), sequence.clone());
        }
        table.fill_known("FieldRecord", DEFAULT_FIELD_RECORD);
        table.fill_known("ns", ns as i64);
        table.fill_known("dt", dt as i64);
        table
    }

    pub fn ntraces(&self) -> usize {
        self.ntraces
    }

    pub fn column(&self, name: &str) -> Option<&[i64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Value of `name` for trace `index`
    pub fn get(&self, name: &str, index: usize) -> Option<i64> {
        self.columns.get(name).and_then(|c| c.get(index)).copied()
    }

    /// Replace a whole column; the length must equal `ntraces`
    pub fn set_column(&mut self, name: &str, values: Vec<i64>) -> Result<()> {
        trace_schema().field(name)?;
        if values.len() != self.ntraces {
            return Err(SegyError::ShapeMismatch(format!(
                "column {} has {} values for {} traces",
                name,
                values.len(),
                self.ntraces
            )));
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    /// Set every trace's `name` to `value`
    pub fn fill(&mut self, name: &str, value: i64) -> Result<()> {
        trace_schema().field(name)?;
        self.fill_known(name, value);
        Ok(())
    }

    fn fill_known(&mut self, name: &str, value: i64) {
        self.columns
            .insert(name.to_string(), vec![value; self.ntraces]);
    }

    /// Set a single value
    pub fn set(&mut self, name: &str, index: usize, value: i64) -> Result<()> {
        let ntraces = self.ntraces;
        let column = self
            .columns
            .get_mut(name)
            .ok_or_else(|| SegyError::UnknownField(name.to_string()))?;
        let slot = column.get_mut(index).ok_or_else(|| {
            SegyError::ShapeMismatch(format!("trace {} out of range for {} traces", index, ntraces))
        })?;
        *slot = value;
        Ok(())
    }

    /// Renumber `TraceNumber` contiguously from 1
    pub fn renumber(&mut self) {
        let sequence = (1..=self.ntraces as i64).collect();
        self.columns.insert("TraceNumber".to_string(), sequence);
    }

    /// Append the traces of `other` field by field
    pub fn append(&mut self, other: &TraceHeaderTable) {
        let added = other.ntraces;
        for (name, column) in self.columns.iter_mut() {
            match other.columns.get(name) {
                Some(values) => column.extend_from_slice(values),
                None => column.extend(std::iter::repeat(0).take(added)),
            }
        }
        for (name, values) in &other.columns {
            if !self.columns.contains_key(name) {
                let mut column = vec![0; self.ntraces];
                column.extend_from_slice(values);
                self.columns.insert(name.clone(), column);
            }
        }
        self.ntraces += added;
    }

    /// Table holding the traces in `range`
    pub fn select(&self, range: std::ops::Range<usize>) -> Result<TraceHeaderTable> {
        if range.start > range.end || range.end > self.ntraces {
            return Err(SegyError::ShapeMismatch(format!(
                "trace range {:?} out of bounds for {} traces",
                range, self.ntraces
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| (name.clone(), values[range.clone()].to_vec()))
            .collect();
        Ok(TraceHeaderTable {
            ntraces: range.len(),
            columns,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[i64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Check the equal-length invariant
    pub fn validate(&self) -> Result<()> {
        for (name, column) in &self.columns {
            if column.len() != self.ntraces {
                return Err(SegyError::ShapeMismatch(format!(
                    "column {} has {} values for {} traces",
                    name,
                    column.len(),
                    self.ntraces
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn from_columns(ntraces: usize, columns: BTreeMap<String, Vec<i64>>) -> Result<Self> {
        let table = Self { ntraces, columns };
        table.validate()?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_defaults() {
        let header = VolumeHeader::with_defaults(9, 60000, 1000);
        assert_eq!(header.ntraces(), 9);
        assert_eq!(header.ns(), 60000);
        assert_eq!(header.dt(), 1000);
        assert_eq!(header.data_sample_format(), 5);
        assert_eq!(header.revision_raw(), 100);
        assert_eq!(header.revision(), Some(1));
        assert_eq!(header.bytes_per_sample().unwrap(), 4);
        assert_eq!(header.get("dtOrig"), Some(1000));
        assert_eq!(header.get("Unassigned1"), None);
    }

    #[test]
    fn test_volume_set_rejects_unknown() {
        let mut header = VolumeHeader::new();
        assert!(header.set("Job", 7).is_ok());
        assert!(matches!(header.set("Bogus", 1), Err(SegyError::UnknownField(_))));
        assert!(header.set("Unassigned2", 1).is_err());
    }

    #[test]
    fn test_trace_defaults() {
        let table = TraceHeaderTable::with_defaults(3, 100, 500);
        assert_eq!(table.column("TraceNumber").unwrap(), &[1, 2, 3]);
        assert_eq!(table.column("FieldRecord").unwrap(), &[1000, 1000, 1000]);
        assert_eq!(table.get("dt", 2), Some(500));
        assert_eq!(table.get("Inline3D", 0), Some(0));
        table.validate().unwrap();
    }

    #[test]
    fn test_set_column_checks_length() {
        let mut table = TraceHeaderTable::new(3);
        let err = table.set_column("Inline3D", vec![1, 2]).unwrap_err();
        assert!(matches!(err, SegyError::ShapeMismatch(_)));
        let err = table.set_column("NotAField", vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, SegyError::UnknownField(_)));
        table.set_column("Inline3D", vec![41, 41, 41]).unwrap();
        assert_eq!(table.get("Inline3D", 1), Some(41));
    }

    #[test]
    fn test_append_and_renumber() {
        let mut a = TraceHeaderTable::with_defaults(3, 10, 1000);
        let b = TraceHeaderTable::with_defaults(2, 10, 1000);
        a.append(&b);
        assert_eq!(a.ntraces(), 5);
        assert_eq!(a.column("TraceNumber").unwrap(), &[1, 2, 3, 1, 2]);
        a.renumber();
        assert_eq!(a.column("TraceNumber").unwrap(), &[1, 2, 3, 4, 5]);
        a.validate().unwrap();
    }

    #[test]
    fn test_select() {
        let table = TraceHeaderTable::with_defaults(6, 10, 1000);
        let part = table.select(2..4).unwrap();
        assert_eq!(part.ntraces(), 2);
        assert_eq!(part.column("TraceNumber").unwrap(), &[3, 4]);
        assert!(table.select(4..7).is_err());
    }
}
