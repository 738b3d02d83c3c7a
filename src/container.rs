//! In-memory SEG-Y container: trace matrix plus volume and trace headers
//!
//! The matrix has shape `(ns, ntraces)`; column `j` is trace `j`. Samples are
//! kept as `f64` so every supported on-disk kind, 32-bit integers included,
//! round-trips exactly.

use crate::error::{Result, SegyError};
use crate::header::{TraceHeaderTable, VolumeHeader};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use ndarray::{s, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// TraceIdentificationCode of the vertical component
pub const CODE_VERTICAL: i64 = 12;
/// TraceIdentificationCode of the cross-line horizontal
pub const CODE_CROSS_LINE: i64 = 13;
/// TraceIdentificationCode of the in-line horizontal
pub const CODE_IN_LINE: i64 = 14;
/// TraceIdentificationCode written for single-component data
pub const CODE_SEISMIC: i64 = 1;

/// How the traces of a multi-component file are arranged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentOrder {
    /// One component only
    Single,
    /// Z, E, N repeating per receiver
    Zen,
    /// E, N, Z repeating per receiver
    Enz,
    /// All Z traces, then all E, then all N
    Grouped,
}

impl ComponentOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentOrder::Single => "Z",
            ComponentOrder::Zen => "ZEN-ZEN-ZEN",
            ComponentOrder::Enz => "ENZ-ENZ-ENZ",
            ComponentOrder::Grouped => "ZZZ-EEE-NNN",
        }
    }

    pub fn component_count(&self) -> usize {
        match self {
            ComponentOrder::Single => 1,
            _ => 3,
        }
    }

    /// Infer the arrangement from a TraceIdentificationCode column
    pub fn derive(codes: &[i64]) -> Self {
        let first = match codes.first() {
            Some(&code) => code,
            None => return ComponentOrder::Single,
        };
        if codes.iter().all(|&code| code == first) {
            return ComponentOrder::Single;
        }
        let horizontal = |code: i64| code == CODE_CROSS_LINE || code == CODE_IN_LINE;
        if first == CODE_VERTICAL && codes.get(1).copied().is_some_and(horizontal) {
            ComponentOrder::Zen
        } else if codes.get(2) == Some(&CODE_VERTICAL) && horizontal(first) {
            ComponentOrder::Enz
        } else {
            ComponentOrder::Grouped
        }
    }
}

impl fmt::Display for ComponentOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentOrder {
    type Err = SegyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Z" | "ZZZ" => Ok(ComponentOrder::Single),
            "ZEN-ZEN-ZEN" | "ZEN" => Ok(ComponentOrder::Zen),
            "ENZ-ENZ-ENZ" | "ENZ" => Ok(ComponentOrder::Enz),
            "ZZZ-EEE-NNN" | "GROUPED" => Ok(ComponentOrder::Grouped),
            other => Err(SegyError::Configuration(format!(
                "unknown component order {}",
                other
            ))),
        }
    }
}

/// Number of components per receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentMode {
    One,
    Three,
}

/// Time base recorded in TimeBaseCode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeBase {
    Local,
    Gmt,
    Other,
    Utc,
}

impl TimeBase {
    /// Unknown codes map to GMT
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => TimeBase::Local,
            3 => TimeBase::Other,
            4 => TimeBase::Utc,
            _ => TimeBase::Gmt,
        }
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimeBase::Local => "Local",
            TimeBase::Gmt => "GMT",
            TimeBase::Other => "Other",
            TimeBase::Utc => "UTC",
        };
        f.write_str(label)
    }
}

/// Summary of a container's derived attributes
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerStats {
    pub ns: usize,
    pub ntraces: usize,
    /// Sample interval in seconds
    pub dt: f64,
    /// Sample rate in hertz
    pub df: f64,
    pub component_count: usize,
    pub order: ComponentOrder,
    pub recorded_at: Option<NaiveDateTime>,
    pub time_base: TimeBase,
    pub data_sample_format: i16,
}

impl fmt::Display for ContainerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "samples per trace : {}", self.ns)?;
        writeln!(f, "traces            : {}", self.ntraces)?;
        writeln!(f, "sample interval   : {} s ({} Hz)", self.dt, self.df)?;
        writeln!(f, "components        : {} ({})", self.component_count, self.order)?;
        writeln!(f, "sample format     : {}", self.data_sample_format)?;
        match self.recorded_at {
            Some(at) => write!(f, "recorded at       : {} {}", at, self.time_base),
            None => write!(f, "recorded at       : unknown"),
        }
    }
}

/// A trace matrix with its volume header and trace header table
#[derive(Debug, Clone, PartialEq)]
pub struct SegyContainer {
    traces: Array2<f64>,
    volume: VolumeHeader,
    headers: TraceHeaderTable,
    order: ComponentOrder,
}

impl SegyContainer {
    /// Assemble a container, validating shapes.
    ///
    /// `ntraces` in the volume header is derived from the matrix; `ns` must agree.
    pub fn new(traces: Array2<f64>, mut volume: VolumeHeader, headers: TraceHeaderTable) -> Result<Self> {
        let (ns, ntraces) = traces.dim();
        if volume.ns() != ns {
            return Err(SegyError::ShapeMismatch(format!(
                "volume header says ns={}, matrix has {} samples per trace",
                volume.ns(),
                ns
            )));
        }
        if headers.ntraces() != ntraces {
            return Err(SegyError::ShapeMismatch(format!(
                "trace header table has {} rows, matrix has {} traces",
                headers.ntraces(),
                ntraces
            )));
        }
        headers.validate()?;
        volume.set_ntraces(ntraces);

        let order = ComponentOrder::derive(headers.column("TraceIdentificationCode").unwrap_or(&[]));
        Ok(Self {
            traces,
            volume,
            headers,
            order,
        })
    }

    /// Container with default headers around `traces`
    pub fn from_traces(traces: Array2<f64>, dt: u32) -> Result<Self> {
        let (ns, ntraces) = traces.dim();
        Self::new(
            traces,
            VolumeHeader::with_defaults(ntraces, ns, dt),
            TraceHeaderTable::with_defaults(ntraces, ns, dt),
        )
    }

    pub fn traces(&self) -> &Array2<f64> {
        &self.traces
    }

    pub fn volume_header(&self) -> &VolumeHeader {
        &self.volume
    }

    pub fn trace_header(&self) -> &TraceHeaderTable {
        &self.headers
    }

    pub fn into_parts(self) -> (Array2<f64>, VolumeHeader, TraceHeaderTable) {
        (self.traces, self.volume, self.headers)
    }

    pub fn ns(&self) -> usize {
        self.traces.nrows()
    }

    pub fn ntraces(&self) -> usize {
        self.traces.ncols()
    }

    /// Sample interval in microseconds
    pub fn dt(&self) -> u32 {
        self.volume.dt()
    }

    pub fn sample_interval_seconds(&self) -> f64 {
        self.dt() as f64 / 1e6
    }

    /// Sample rate in hertz, 0 when dt is unset
    pub fn sample_rate(&self) -> f64 {
        match self.dt() {
            0 => 0.0,
            dt => 1e6 / dt as f64,
        }
    }

    /// Time of each sample relative to the first, in seconds
    pub fn sample_times(&self) -> Vec<f64> {
        let dt = self.sample_interval_seconds();
        (0..self.ns()).map(|i| i as f64 * dt).collect()
    }

    pub fn component_order(&self) -> ComponentOrder {
        self.order
    }

    pub fn component_count(&self) -> usize {
        self.order.component_count()
    }

    /// Timestamp of trace 0; zero year or day are read as 1
    pub fn recorded_at(&self) -> Result<NaiveDateTime> {
        let field = |name: &str| {
            self.headers
                .get(name, 0)
                .ok_or_else(|| SegyError::InvalidTimestamp(format!("no {} on trace 0", name)))
        };
        let year = field("YearDataRecorded")?.max(1);
        let day = field("DayOfYear")?.max(1);
        let (hour, minute, second) = (field("HourOfDay")?, field("MinuteOfHour")?, field("SecondOfMinute")?);

        let invalid = || {
            SegyError::InvalidTimestamp(format!(
                "year {} day {} {:02}:{:02}:{:02}",
                year, day, hour, minute, second
            ))
        };
        let date = NaiveDate::from_ymd_opt(year as i32, 1, 1)
            .and_then(|jan1| jan1.checked_add_signed(Duration::days(day - 1)))
            .ok_or_else(invalid)?;
        let time = u32::try_from(hour)
            .ok()
            .zip(u32::try_from(minute).ok())
            .zip(u32::try_from(second).ok())
            .and_then(|((h, m), s)| NaiveTime::from_hms_opt(h, m, s))
            .ok_or_else(invalid)?;
        Ok(date.and_time(time))
    }

    pub fn time_base(&self) -> TimeBase {
        TimeBase::from_code(self.headers.get("TimeBaseCode", 0).unwrap_or(0))
    }

    pub fn stats(&self) -> ContainerStats {
        let dt = self.sample_interval_seconds();
        ContainerStats {
            ns: self.ns(),
            ntraces: self.ntraces(),
            dt,
            df: self.sample_rate(),
            component_count: self.component_count(),
            order: self.order,
            recorded_at: self.recorded_at().ok(),
            time_base: self.time_base(),
            data_sample_format: self.volume.data_sample_format(),
        }
    }

    /// Vertical traces; every trace for single-component data
    pub fn z_traces(&self) -> ArrayView2<'_, f64> {
        let n = self.ntraces();
        match self.order {
            ComponentOrder::Single => self.traces.view(),
            ComponentOrder::Zen => self.traces.slice(s![.., 0..;3]),
            ComponentOrder::Enz => self.traces.slice(s![.., 2..;3]),
            ComponentOrder::Grouped => self.traces.slice(s![.., 0..n / 3]),
        }
    }

    /// First horizontal component
    pub fn x_traces(&self) -> Option<ArrayView2<'_, f64>> {
        let n = self.ntraces();
        match self.order {
            ComponentOrder::Single => None,
            ComponentOrder::Zen => Some(self.traces.slice(s![.., 1..;3])),
            ComponentOrder::Enz => Some(self.traces.slice(s![.., 0..;3])),
            ComponentOrder::Grouped => Some(self.traces.slice(s![.., n / 3..2 * n / 3])),
        }
    }

    /// Second horizontal component
    pub fn y_traces(&self) -> Option<ArrayView2<'_, f64>> {
        let n = self.ntraces();
        match self.order {
            ComponentOrder::Single => None,
            ComponentOrder::Zen => Some(self.traces.slice(s![.., 2..;3])),
            ComponentOrder::Enz => Some(self.traces.slice(s![.., 1..;3])),
            ComponentOrder::Grouped => Some(self.traces.slice(s![.., 2 * n / 3..n])),
        }
    }

    /// Replace the whole sample matrix; the trace count must not change
    pub fn set_trace_data(&mut self, traces: Array2<f64>) -> Result<()> {
        if traces.ncols() != self.ntraces() {
            return Err(SegyError::ShapeMismatch(format!(
                "replacement has {} traces, container has {}",
                traces.ncols(),
                self.ntraces()
            )));
        }
        let ns = traces.nrows();
        self.volume.set("ns", ns as i64)?;
        self.headers.fill("ns", ns as i64)?;
        self.traces = traces;
        Ok(())
    }

    /// Replace the whole trace header table
    pub fn set_trace_header(&mut self, headers: TraceHeaderTable) -> Result<()> {
        if headers.ntraces() != self.ntraces() {
            return Err(SegyError::ShapeMismatch(format!(
                "trace header table has {} rows, container has {} traces",
                headers.ntraces(),
                self.ntraces()
            )));
        }
        headers.validate()?;
        self.order = ComponentOrder::derive(headers.column("TraceIdentificationCode").unwrap_or(&[]));
        self.headers = headers;
        Ok(())
    }

    /// Replace the volume header; `ns` must match the matrix
    pub fn set_volume_header(&mut self, mut volume: VolumeHeader) -> Result<()> {
        if volume.ns() != self.ns() {
            return Err(SegyError::ShapeMismatch(format!(
                "volume header says ns={}, matrix has {}",
                volume.ns(),
                self.ns()
            )));
        }
        volume.set_ntraces(self.ntraces());
        self.volume = volume;
        Ok(())
    }

    /// Set the value of one header column on every trace
    pub fn set_trace_column(&mut self, name: &str, values: Vec<i64>) -> Result<()> {
        self.headers.set_column(name, values)?;
        if name == "TraceIdentificationCode" {
            self.order = ComponentOrder::derive(self.headers.column(name).unwrap_or(&[]));
        }
        Ok(())
    }

    /// Rewrite TraceIdentificationCode for the given layout
    pub fn set_trace_identification_code(&mut self, mode: ComponentMode, order: ComponentOrder) -> Result<()> {
        let n = self.ntraces();
        let (codes, order): (Vec<i64>, ComponentOrder) = match (mode, order) {
            (ComponentMode::One, _) => (vec![CODE_SEISMIC; n], ComponentOrder::Single),
            (_, ComponentOrder::Zen) => (
                (0..n)
                    .map(|i| [CODE_VERTICAL, CODE_CROSS_LINE, CODE_IN_LINE][i % 3])
                    .collect(),
                ComponentOrder::Zen,
            ),
            (_, ComponentOrder::Enz) => (
                (0..n)
                    .map(|i| [CODE_CROSS_LINE, CODE_IN_LINE, CODE_VERTICAL][i % 3])
                    .collect(),
                ComponentOrder::Enz,
            ),
            _ => (
                (0..n)
                    .map(|i| {
                        if i < n / 3 {
                            CODE_VERTICAL
                        } else if i < 2 * n / 3 {
                            CODE_CROSS_LINE
                        } else {
                            CODE_IN_LINE
                        }
                    })
                    .collect(),
                ComponentOrder::Grouped,
            ),
        };
        self.headers.set_column("TraceIdentificationCode", codes)?;
        self.order = order;
        Ok(())
    }

    /// Copy of the samples in `range` with all headers carried over
    pub fn select_samples(&self, range: std::ops::Range<usize>) -> Result<SegyContainer> {
        if range.start > range.end || range.end > self.ns() {
            return Err(SegyError::ShapeMismatch(format!(
                "sample range {:?} out of bounds for ns={}",
                range,
                self.ns()
            )));
        }
        let ns = range.len();
        let traces = self.traces.slice_axis(Axis(0), range.into()).to_owned();
        let mut volume = self.volume.clone();
        volume.set("ns", ns as i64)?;
        let mut headers = self.headers.clone();
        headers.fill("ns", ns as i64)?;
        Ok(SegyContainer {
            traces,
            volume,
            headers,
            order: self.order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(ntraces: usize, ns: usize) -> SegyContainer {
        let data = Array2::from_shape_fn((ns, ntraces), |(i, j)| (j * 1000 + i) as f64);
        SegyContainer::from_traces(data, 1000).unwrap()
    }

    #[test]
    fn test_derive_component_order() {
        assert_eq!(ComponentOrder::derive(&[12, 13, 14, 12, 13, 14]), ComponentOrder::Zen);
        assert_eq!(ComponentOrder::derive(&[14, 13, 12, 14, 13, 12]), ComponentOrder::Enz);
        assert_eq!(ComponentOrder::derive(&[12, 12, 13, 13, 14, 14]), ComponentOrder::Grouped);
        assert_eq!(ComponentOrder::derive(&[1, 1, 1]), ComponentOrder::Single);
        assert_eq!(ComponentOrder::derive(&[]), ComponentOrder::Single);
    }

    #[test]
    fn test_shape_is_validated() {
        let data = Array2::<f64>::zeros((10, 3));
        let err = SegyContainer::new(
            data.clone(),
            VolumeHeader::with_defaults(3, 11, 1000),
            TraceHeaderTable::with_defaults(3, 10, 1000),
        )
        .unwrap_err();
        assert!(matches!(err, SegyError::ShapeMismatch(_)));

        let err = SegyContainer::new(
            data,
            VolumeHeader::with_defaults(3, 10, 1000),
            TraceHeaderTable::with_defaults(2, 10, 1000),
        )
        .unwrap_err();
        assert!(matches!(err, SegyError::ShapeMismatch(_)));
    }

    #[test]
    fn test_recorded_at_treats_zero_as_one() {
        let c = container(1, 4);
        let at = c.recorded_at().unwrap();
        assert_eq!(at, NaiveDate::from_ymd_opt(1, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(c.time_base(), TimeBase::Gmt);
    }

    #[test]
    fn test_recorded_at_from_headers() {
        let mut c = container(2, 4);
        c.set_trace_column("YearDataRecorded", vec![2018, 2018]).unwrap();
        c.set_trace_column("DayOfYear", vec![335, 335]).unwrap();
        c.set_trace_column("HourOfDay", vec![13, 13]).unwrap();
        c.set_trace_column("MinuteOfHour", vec![7, 7]).unwrap();
        c.set_trace_column("SecondOfMinute", vec![30, 30]).unwrap();
        c.set_trace_column("TimeBaseCode", vec![4, 4]).unwrap();
        let at = c.recorded_at().unwrap();
        assert_eq!(at, NaiveDate::from_ymd_opt(2018, 12, 1).unwrap().and_hms_opt(13, 7, 30).unwrap());
        assert_eq!(c.time_base(), TimeBase::Utc);
    }

    #[test]
    fn test_set_trace_identification_code_zen() {
        let mut c = container(6, 5);
        c.set_trace_identification_code(ComponentMode::Three, ComponentOrder::Zen).unwrap();
        assert_eq!(
            c.trace_header().column("TraceIdentificationCode").unwrap(),
            &[12, 13, 14, 12, 13, 14]
        );
        assert_eq!(c.component_count(), 3);
        assert_eq!(c.z_traces().ncols(), 2);
        assert_eq!(c.z_traces()[[0, 1]], 3000.0);
        assert_eq!(c.x_traces().unwrap()[[0, 0]], 1000.0);
        assert_eq!(c.y_traces().unwrap()[[0, 1]], 5000.0);
    }

    #[test]
    fn test_set_trace_identification_code_grouped_and_single() {
        let mut c = container(6, 5);
        c.set_trace_identification_code(ComponentMode::Three, ComponentOrder::Grouped).unwrap();
        assert_eq!(
            c.trace_header().column("TraceIdentificationCode").unwrap(),
            &[12, 12, 13, 13, 14, 14]
        );
        assert_eq!(c.y_traces().unwrap()[[0, 0]], 4000.0);

        c.set_trace_identification_code(ComponentMode::One, ComponentOrder::Zen).unwrap();
        assert_eq!(c.component_order(), ComponentOrder::Single);
        assert_eq!(c.trace_header().column("TraceIdentificationCode").unwrap(), &[1; 6]);
        assert!(c.x_traces().is_none());
        assert_eq!(c.z_traces().ncols(), 6);
    }

    #[test]
    fn test_select_samples() {
        let c = container(3, 10);
        let part = c.select_samples(4..8).unwrap();
        assert_eq!(part.ns(), 4);
        assert_eq!(part.volume_header().ns(), 4);
        assert_eq!(part.trace_header().get("ns", 2), Some(4));
        assert_eq!(part.traces()[[0, 2]], 2004.0);
        assert!(c.select_samples(8..11).is_err());
    }

    #[test]
    fn test_sample_times() {
        let c = container(1, 3);
        assert_eq!(c.sample_times(), vec![0.0, 0.001, 0.002]);
        assert_eq!(c.sample_rate(), 1000.0);
    }
}
