//! Conversion settings
//!
//! Every key has a default, so an empty TOML or JSON document is a valid
//! configuration.

use crate::error::{Result, SegyError};
use crate::schema::{self, trace_schema};
use crate::types::{Endian, NumericKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How many whole windows a continuous recording is cut into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// `floor(n / w) - 1` windows; the last complete window is dropped too
    #[default]
    DropTrailing,
    /// `floor(n / w)` windows
    CompleteOnly,
}

impl WindowPolicy {
    /// Number of windows of `window` samples cut from `total` samples
    pub fn window_count(&self, total: usize, window: usize) -> usize {
        if window == 0 {
            return 0;
        }
        let complete = total / window;
        match self {
            WindowPolicy::DropTrailing => complete.saturating_sub(1),
            WindowPolicy::CompleteOnly => complete,
        }
    }
}

/// Windowing of time-lapse recordings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window length in seconds
    pub seconds: u32,
    pub policy: WindowPolicy,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            seconds: 60,
            policy: WindowPolicy::default(),
        }
    }
}

/// Single-channel time-lapse recordings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LapseConfig {
    /// Bytes skipped before the samples of each channel file
    pub header_size: usize,
    /// Samples trimmed from the common aligned length
    pub safety_margin: usize,
    pub sample_format: NumericKind,
    pub endian: Endian,
}

impl Default for LapseConfig {
    fn default() -> Self {
        Self {
            header_size: 2048,
            safety_margin: 30_000,
            sample_format: NumericKind::Int32,
            endian: Endian::Little,
        }
    }
}

/// Settings shared by both conversion strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Bytes skipped before the interleaved samples of a minute file
    pub header_size: usize,
    /// Digits prepended to a receiver folder name to form its numeric id
    pub receiver_prefix: String,
    /// Keep only this many leading characters of a receiver folder name
    pub receiver_name_digits: Option<usize>,
    /// Trace header field receiving receiver ids
    pub receiver_field: String,
    /// Sample kind of minute files
    pub sample_format: NumericKind,
    pub raw_endian: Endian,
    /// Sample interval in microseconds
    pub dt: u32,
    /// DataSampleFormat written to SEG-Y
    pub output_format: i16,
    pub textual_header: Option<String>,
    /// Leave existing outputs untouched
    pub skip_existing: bool,
    pub window: WindowConfig,
    pub lapse: LapseConfig,
    /// Buckets converted concurrently
    pub parallelism: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            header_size: 512,
            receiver_prefix: "4".to_string(),
            receiver_name_digits: None,
            receiver_field: "Inline3D".to_string(),
            sample_format: NumericKind::Int32,
            raw_endian: Endian::Little,
            dt: 1000,
            output_format: 5,
            textual_header: None,
            skip_existing: false,
            window: WindowConfig::default(),
            lapse: LapseConfig::default(),
            parallelism: 1,
        }
    }
}

impl ConvertConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SegyError::from(e).at(path))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&text),
            Some("json") => Self::from_json(&text),
            _ => Err(SegyError::Configuration(format!(
                "unrecognized configuration format: {}",
                path.display()
            ))),
        };
        config.map_err(|e| e.at(path))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SegyError::Configuration(e.to_string()))
    }

    pub fn with_header_size(mut self, header_size: usize) -> Self {
        self.header_size = header_size;
        self
    }

    pub fn with_receiver_field(mut self, field: impl Into<String>) -> Self {
        self.receiver_field = field.into();
        self
    }

    pub fn with_sample_format(mut self, kind: NumericKind) -> Self {
        self.sample_format = kind;
        self
    }

    pub fn with_dt(mut self, dt: u32) -> Self {
        self.dt = dt;
        self
    }

    pub fn with_output_format(mut self, format: i16) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_window_policy(mut self, policy: WindowPolicy) -> Self {
        self.window.policy = policy;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Window length in samples at `dt`
    pub fn window_samples(&self, dt: u32) -> usize {
        if dt == 0 {
            return 0;
        }
        (self.window.seconds as u64 * 1_000_000 / dt as u64) as usize
    }

    /// Reject settings that would make every bucket fail
    pub fn validate(&self) -> Result<()> {
        let field = trace_schema()
            .get(&self.receiver_field)
            .filter(|f| f.is_scalar())
            .ok_or_else(|| {
                SegyError::Configuration(format!("unknown receiver field {}", self.receiver_field))
            })?;
        if field.kind.size_in_bytes() < 4 {
            tracing::warn!(
                field = field.name,
                "Receiver field is narrower than 32 bits, large ids will not fit"
            );
        }
        schema::numeric_kind_for(1, self.output_format)
            .map_err(|_| SegyError::Configuration(format!("unsupported output format {}", self.output_format)))?;
        if self.receiver_prefix.chars().any(|c| !c.is_ascii_digit()) {
            return Err(SegyError::Configuration(format!(
                "receiver prefix {:?} is not numeric",
                self.receiver_prefix
            )));
        }
        if self.dt == 0 {
            return Err(SegyError::Configuration("dt must be positive".to_string()));
        }
        if self.window.seconds == 0 {
            return Err(SegyError::Configuration("window length must be positive".to_string()));
        }
        let window = self.window_samples(self.dt);
        if window > u16::MAX as usize {
            return Err(SegyError::Configuration(format!(
                "a {} s window at dt {} us is {} samples, more than a trace header holds",
                self.window.seconds, self.dt, window
            )));
        }
        if self.parallelism == 0 {
            return Err(SegyError::Configuration("parallelism must be at least 1".to_string()));
        }
        Ok(())
    }
}
