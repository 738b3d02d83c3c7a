//! Static SEG-Y header layouts and the data-sample-format table
//!
//! Two schemas exist: the volume schema (3200-byte textual header plus the
//! 400-byte binary header, offsets counted from the start of the file) and the
//! trace schema (240 bytes, offsets counted from the start of each trace block).
//! Both are built once and only handed out by shared reference.

use crate::error::{Result, SegyError};
use crate::types::NumericKind;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Size of the textual file header
pub const TEXTUAL_HEADER_BYTES: usize = 3200;
/// Size of the binary volume header
pub const BINARY_HEADER_BYTES: usize = 400;
/// Offset of the first trace block
pub const VOLUME_HEADER_SPAN: usize = TEXTUAL_HEADER_BYTES + BINARY_HEADER_BYTES;
/// Size of each trace header
pub const TRACE_HEADER_BYTES: usize = 240;

/// Location and encoding of one header field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    /// Byte offset relative to the start of the header region
    pub offset: usize,
    pub kind: NumericKind,
    pub count: usize,
    pub default: i64,
    /// Enumerated value labels, empty when the field is free-valued
    pub descriptions: &'static [(i64, &'static str)],
}

impl FieldDescriptor {
    const fn new(name: &'static str, offset: usize, kind: NumericKind) -> Self {
        Self {
            name,
            offset,
            kind,
            count: 1,
            default: 0,
            descriptions: &[],
        }
    }

    const fn with_default(mut self, default: i64) -> Self {
        self.default = default;
        self
    }

    const fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    const fn with_descriptions(mut self, descriptions: &'static [(i64, &'static str)]) -> Self {
        self.descriptions = descriptions;
        self
    }

    /// Bytes covered by this field
    pub fn byte_len(&self) -> usize {
        self.kind.size_in_bytes() * self.count
    }

    /// Multi-element fields are unassigned padding and carry no scalar value
    pub fn is_scalar(&self) -> bool {
        self.count == 1
    }

    /// Label of an enumerated value
    pub fn describe(&self, value: i64) -> Option<&'static str> {
        self.descriptions
            .iter()
            .find(|(code, _)| *code == value)
            .map(|(_, label)| *label)
    }
}

/// An ordered, immutable set of header fields
#[derive(Debug)]
pub struct HeaderSchema {
    name: &'static str,
    span: usize,
    fields: &'static [FieldDescriptor],
    index: HashMap<&'static str, usize>,
}

impl HeaderSchema {
    fn build(name: &'static str, span: usize, fields: &'static [FieldDescriptor]) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, field)| (field.name, i))
            .collect();
        let schema = Self {
            name,
            span,
            fields,
            index,
        };
        debug_assert!(schema.validate().is_ok(), "{} schema is inconsistent", name);
        schema
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Total bytes covered by the header region
    pub fn span(&self) -> usize {
        self.span
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Look up a field, failing with [`SegyError::UnknownField`]
    pub fn field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.get(name)
            .ok_or_else(|| SegyError::UnknownField(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Fields in layout order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    /// Fields that hold a value (padding excluded)
    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_scalar())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check names are unique, fields fit the span and never overlap
    pub fn validate(&self) -> Result<()> {
        if self.index.len() != self.fields.len() {
            return Err(SegyError::Configuration(format!(
                "{} schema has duplicate field names",
                self.name
            )));
        }

        let mut ranges: Vec<(usize, usize, &str)> = self
            .fields
            .iter()
            .map(|f| (f.offset, f.offset + f.byte_len(), f.name))
            .collect();
        ranges.sort_unstable();

        for pair in ranges.windows(2) {
            if pair[0].1 > pair[1].0 {
                return Err(SegyError::Configuration(format!(
                    "{} schema: {} overlaps {}",
                    self.name, pair[0].2, pair[1].2
                )));
            }
        }
        if let Some(&(_, end, name)) = ranges.last() {
            if end > self.span {
                return Err(SegyError::Configuration(format!(
                    "{} schema: {} ends at {} past span {}",
                    self.name, name, end, self.span
                )));
            }
        }
        Ok(())
    }
}

use NumericKind::{Int16, Int32, UInt16};

const DATA_SAMPLE_FORMAT_LABELS: &[(i64, &str)] = &[
    (1, "IBM Float"),
    (2, "32 bit Integer"),
    (3, "16 bit Integer"),
    (4, "32 bit Fixed Point"),
    (5, "IEEE"),
    (8, "8 bit Integer"),
];

const VOLUME_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("Job", 3200, Int32),
    FieldDescriptor::new("Line", 3204, Int32),
    FieldDescriptor::new("Reel", 3208, Int32),
    FieldDescriptor::new("DataTracePerEnsemble", 3212, Int16),
    FieldDescriptor::new("AuxiliaryTracePerEnsemble", 3214, Int16),
    FieldDescriptor::new("dt", 3216, UInt16).with_default(1000),
    FieldDescriptor::new("dtOrig", 3218, UInt16).with_default(1000),
    FieldDescriptor::new("ns", 3220, UInt16),
    FieldDescriptor::new("nsOrig", 3222, UInt16),
    FieldDescriptor::new("DataSampleFormat", 3224, Int16)
        .with_default(5)
        .with_descriptions(DATA_SAMPLE_FORMAT_LABELS),
    FieldDescriptor::new("EnsembleFold", 3226, Int16),
    FieldDescriptor::new("TraceSorting", 3228, Int16),
    FieldDescriptor::new("VerticalSumCode", 3230, Int16),
    FieldDescriptor::new("SweepFrequencyStart", 3232, Int16),
    FieldDescriptor::new("SweepFrequencyEnd", 3234, Int16),
    FieldDescriptor::new("SweepLength", 3236, Int16),
    FieldDescriptor::new("SweepType", 3238, Int16),
    FieldDescriptor::new("SweepChannel", 3240, Int16),
    FieldDescriptor::new("SweepTaperlengthStart", 3242, Int16),
    FieldDescriptor::new("SweepTaperLengthEnd", 3244, Int16),
    FieldDescriptor::new("TaperType", 3246, Int16),
    FieldDescriptor::new("CorrelatedDataTraces", 3248, Int16),
    FieldDescriptor::new("BinaryGain", 3250, Int16),
    FieldDescriptor::new("AmplitudeRecoveryMethod", 3252, Int16),
    FieldDescriptor::new("MeasurementSystem", 3254, Int16),
    FieldDescriptor::new("ImpulseSignalPolarity", 3256, Int16),
    FieldDescriptor::new("VibratoryPolarityCode", 3258, Int16),
    FieldDescriptor::new("Unassigned1", 3260, Int16).with_count(120),
    FieldDescriptor::new("SegyFormatRevisionNumber", 3500, UInt16).with_default(100),
    FieldDescriptor::new("FixedLengthTraceFlag", 3502, UInt16),
    FieldDescriptor::new("NumberOfExtTextualHeaders", 3504, UInt16),
    FieldDescriptor::new("Unassigned2", 3506, Int16).with_count(47),
];

const TRACE_ID_LABELS: &[(i64, &str)] = &[
    (-1, "Other"),
    (0, "Unknown"),
    (1, "Seismic data"),
    (2, "Dead"),
    (3, "Dummy"),
    (4, "Time break"),
    (5, "Uphole"),
    (6, "Sweep"),
    (7, "Timing"),
    (8, "Waterbreak"),
    (9, "Near-field gun signature"),
    (10, "Far-field gun signature"),
    (11, "Seismic pressure sensor"),
    (12, "Multicomponent seismic sensor - Vertical component"),
    (13, "Multicomponent seismic sensor - Cross-line component"),
    (14, "Multicomponent seismic sensor - In-line component"),
    (15, "Rotated multicomponent seismic sensor - Vertical component"),
    (16, "Rotated multicomponent seismic sensor - Transverse component"),
    (17, "Rotated multicomponent seismic sensor - Radial component"),
    (18, "Vibrator reaction mass"),
    (19, "Vibrator baseplate"),
    (20, "Vibrator estimated ground force"),
    (21, "Vibrator reference"),
    (22, "Time-velocity pairs"),
];

const DATA_USE_LABELS: &[(i64, &str)] = &[(1, "Production"), (2, "Test")];

const COORDINATE_UNIT_LABELS: &[(i64, &str)] = &[
    (1, "Length (meters or feet)"),
    (2, "Seconds of arc"),
    (3, "Decimal degrees"),
    (4, "Degrees, minutes, seconds (DMS)"),
];

const GAIN_TYPE_LABELS: &[(i64, &str)] = &[(1, "Fixed"), (2, "Binary"), (3, "Floating point")];

const CORRELATED_LABELS: &[(i64, &str)] = &[(1, "No"), (2, "Yes")];

const SWEEP_TYPE_LABELS: &[(i64, &str)] = &[
    (1, "linear"),
    (2, "parabolic"),
    (3, "exponential"),
    (4, "other"),
];

const TAPER_TYPE_LABELS: &[(i64, &str)] = &[(1, "linear"), (2, "cos2c"), (3, "other")];

const TIME_BASE_LABELS: &[(i64, &str)] = &[(1, "Local"), (2, "GMT"), (3, "Other"), (4, "UTC")];

const OVER_TRAVEL_LABELS: &[(i64, &str)] = &[
    (1, "down (or behind)"),
    (2, "up (or ahead)"),
    (3, "other"),
];

const MEASUREMENT_UNIT_LABELS: &[(i64, &str)] = &[
    (-1, "Other"),
    (0, "Unknown"),
    (1, "Pascal (Pa)"),
    (2, "Volts (V)"),
    (3, "Millivolts (mV)"),
    (4, "Amperes (A)"),
    (5, "Meters (m)"),
    (6, "Meters Per Second (m/s)"),
    (7, "Meters Per Second squared (m/s2)"),
    (8, "Newton (N)"),
    (9, "Watt (W)"),
];

const SOURCE_TYPE_LABELS: &[(i64, &str)] = &[
    (-1, "Other"),
    (0, "Unknown"),
    (1, "Vibratory - Vertical orientation"),
    (2, "Vibratory - Cross-line orientation"),
    (3, "Vibratory - In-line orientation"),
    (4, "Impulsive - Vertical orientation"),
    (5, "Impulsive - Cross-line orientation"),
    (6, "Impulsive - In-line orientation"),
    (7, "Distributed Impulsive - Vertical orientation"),
    (8, "Distributed Impulsive - Cross-line orientation"),
    (9, "Distributed Impulsive - In-line orientation"),
];

const SOURCE_MEASUREMENT_UNIT_LABELS: &[(i64, &str)] = &[
    (-1, "Other"),
    (0, "Unknown"),
    (1, "Joule (J)"),
    (2, "Kilowatt (kW)"),
    (3, "Pascal (Pa)"),
    (4, "Bar (Bar)"),
    (5, "Newton (N)"),
    (6, "Kilograms (kg)"),
];

const TRACE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("TraceSequenceLine", 0, Int32),
    FieldDescriptor::new("TraceSequenceFile", 4, Int32),
    FieldDescriptor::new("FieldRecord", 8, Int32),
    FieldDescriptor::new("TraceNumber", 12, Int32),
    FieldDescriptor::new("EnergySourcePoint", 16, Int32),
    FieldDescriptor::new("cdp", 20, Int32),
    FieldDescriptor::new("cdpTrace", 24, Int32),
    FieldDescriptor::new("TraceIdentificationCode", 28, UInt16).with_descriptions(TRACE_ID_LABELS),
    FieldDescriptor::new("NSummedTraces", 30, Int16),
    FieldDescriptor::new("NStackedTraces", 32, Int16),
    FieldDescriptor::new("DataUse", 34, Int16).with_descriptions(DATA_USE_LABELS),
    FieldDescriptor::new("offset", 36, Int32),
    FieldDescriptor::new("ReceiverGroupElevation", 40, Int32),
    FieldDescriptor::new("SourceSurfaceElevation", 44, Int32),
    FieldDescriptor::new("SourceDepth", 48, Int32),
    FieldDescriptor::new("ReceiverDatumElevation", 52, Int32),
    FieldDescriptor::new("SourceDatumElevation", 56, Int32),
    FieldDescriptor::new("SourceWaterDepth", 60, Int32),
    FieldDescriptor::new("GroupWaterDepth", 64, Int32),
    FieldDescriptor::new("ElevationScalar", 68, Int16),
    FieldDescriptor::new("SourceGroupScalar", 70, Int16),
    FieldDescriptor::new("SourceX", 72, Int32),
    FieldDescriptor::new("SourceY", 76, Int32),
    FieldDescriptor::new("GroupX", 80, Int32),
    FieldDescriptor::new("GroupY", 84, Int32),
    FieldDescriptor::new("CoordinateUnits", 88, Int16).with_descriptions(COORDINATE_UNIT_LABELS),
    FieldDescriptor::new("WeatheringVelocity", 90, Int16),
    FieldDescriptor::new("SubWeatheringVelocity", 92, Int16),
    FieldDescriptor::new("SourceUpholeTime", 94, Int16),
    FieldDescriptor::new("GroupUpholeTime", 96, Int16),
    FieldDescriptor::new("SourceStaticCorrection", 98, Int16),
    FieldDescriptor::new("GroupStaticCorrection", 100, Int16),
    FieldDescriptor::new("TotalStaticApplied", 102, Int16),
    FieldDescriptor::new("LagTimeA", 104, Int16),
    FieldDescriptor::new("LagTimeB", 106, Int16),
    FieldDescriptor::new("DelayRecordingTime", 108, Int16),
    FieldDescriptor::new("MuteTimeStart", 110, Int16),
    FieldDescriptor::new("MuteTimeEND", 112, Int16),
    FieldDescriptor::new("ns", 114, UInt16),
    FieldDescriptor::new("dt", 116, UInt16),
    FieldDescriptor::new("GainType", 118, Int16).with_descriptions(GAIN_TYPE_LABELS),
    FieldDescriptor::new("InstrumentGainConstant", 120, Int16),
    FieldDescriptor::new("InstrumentInitialGain", 122, Int16),
    FieldDescriptor::new("Correlated", 124, Int16).with_descriptions(CORRELATED_LABELS),
    FieldDescriptor::new("SweepFrequenceStart", 126, Int16),
    FieldDescriptor::new("SweepFrequenceEnd", 128, Int16),
    FieldDescriptor::new("SweepLength", 130, Int16),
    FieldDescriptor::new("SweepType", 132, Int16).with_descriptions(SWEEP_TYPE_LABELS),
    FieldDescriptor::new("SweepTraceTaperLengthStart", 134, Int16),
    FieldDescriptor::new("SweepTraceTaperLengthEnd", 136, Int16),
    FieldDescriptor::new("TaperType", 138, Int16).with_descriptions(TAPER_TYPE_LABELS),
    FieldDescriptor::new("AliasFilterFrequency", 140, Int16),
    FieldDescriptor::new("AliasFilterSlope", 142, Int16),
    FieldDescriptor::new("NotchFilterFrequency", 144, Int16),
    FieldDescriptor::new("NotchFilterSlope", 146, Int16),
    FieldDescriptor::new("LowCutFrequency", 148, Int16),
    FieldDescriptor::new("HighCutFrequency", 150, Int16),
    FieldDescriptor::new("LowCutSlope", 152, Int16),
    FieldDescriptor::new("HighCutSlope", 154, Int16),
    FieldDescriptor::new("YearDataRecorded", 156, Int16),
    FieldDescriptor::new("DayOfYear", 158, Int16),
    FieldDescriptor::new("HourOfDay", 160, Int16),
    FieldDescriptor::new("MinuteOfHour", 162, Int16),
    FieldDescriptor::new("SecondOfMinute", 164, Int16),
    FieldDescriptor::new("TimeBaseCode", 166, Int16).with_descriptions(TIME_BASE_LABELS),
    FieldDescriptor::new("TraceWeightningFactor", 168, Int16),
    FieldDescriptor::new("GeophoneGroupNumberRoll1", 170, Int16),
    FieldDescriptor::new("GeophoneGroupNumberFirstTraceOrigField", 172, Int16),
    FieldDescriptor::new("GeophoneGroupNumberLastTraceOrigField", 174, Int16),
    FieldDescriptor::new("GapSize", 176, Int16),
    FieldDescriptor::new("OverTravel", 178, Int16).with_descriptions(OVER_TRAVEL_LABELS),
    FieldDescriptor::new("cdpX", 180, Int32),
    FieldDescriptor::new("cdpY", 184, Int32),
    FieldDescriptor::new("Inline3D", 188, Int32),
    FieldDescriptor::new("Crossline3D", 192, Int32),
    FieldDescriptor::new("ShotPoint", 196, Int32),
    FieldDescriptor::new("ShotPointScalar", 200, Int16),
    FieldDescriptor::new("TraceValueMeasurementUnit", 202, Int16)
        .with_descriptions(MEASUREMENT_UNIT_LABELS),
    FieldDescriptor::new("TransductionConstantMantissa", 204, Int32),
    FieldDescriptor::new("TransductionConstantPower", 208, Int16),
    FieldDescriptor::new("TransductionUnit", 210, Int16).with_descriptions(MEASUREMENT_UNIT_LABELS),
    FieldDescriptor::new("TraceIdentifier", 212, Int16),
    FieldDescriptor::new("ScalarTraceHeader", 214, Int16),
    FieldDescriptor::new("SourceType", 216, Int16).with_descriptions(SOURCE_TYPE_LABELS),
    FieldDescriptor::new("SourceEnergyDirectionMantissa", 218, Int32),
    FieldDescriptor::new("SourceEnergyDirectionExponent", 222, Int16),
    FieldDescriptor::new("SourceMeasurementMantissa", 224, Int32),
    FieldDescriptor::new("SourceMeasurementExponent", 228, Int16),
    FieldDescriptor::new("SourceMeasurementUnit", 230, Int16)
        .with_descriptions(SOURCE_MEASUREMENT_UNIT_LABELS),
    FieldDescriptor::new("UnassignedInt1", 232, Int32),
    FieldDescriptor::new("UnassignedInt2", 236, Int32),
];

/// The 3200 + 400 byte file header layout
pub fn volume_schema() -> &'static HeaderSchema {
    static SCHEMA: OnceLock<HeaderSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| HeaderSchema::build("volume", VOLUME_HEADER_SPAN, VOLUME_FIELDS))
}

/// The 240 byte trace header layout
pub fn trace_schema() -> &'static HeaderSchema {
    static SCHEMA: OnceLock<HeaderSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| HeaderSchema::build("trace", TRACE_HEADER_BYTES, TRACE_FIELDS))
}

/// One entry of the data-sample-format table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    pub code: i16,
    pub bytes_per_sample: usize,
    /// `None` for formats the codec cannot decode (fixed point with gain)
    pub kind: Option<NumericKind>,
    pub description: &'static str,
}

const fn sample_format(
    code: i16,
    bytes_per_sample: usize,
    kind: Option<NumericKind>,
    description: &'static str,
) -> SampleFormat {
    SampleFormat {
        code,
        bytes_per_sample,
        kind,
        description,
    }
}

const REVISION_0_FORMATS: &[SampleFormat] = &[
    sample_format(1, 4, Some(NumericKind::Ibm32), "IBM Float"),
    sample_format(2, 4, Some(NumericKind::Int32), "32 bit Integer"),
    sample_format(3, 2, Some(NumericKind::Int16), "16 bit Integer"),
    sample_format(4, 4, None, "32 bit Fixed Point"),
];

const REVISION_1_FORMATS: &[SampleFormat] = &[
    sample_format(1, 4, Some(NumericKind::Ibm32), "IBM Float"),
    sample_format(2, 4, Some(NumericKind::Int32), "32 bit Integer"),
    sample_format(3, 2, Some(NumericKind::Int16), "16 bit Integer"),
    sample_format(4, 4, None, "32 bit Fixed Point"),
    sample_format(5, 4, Some(NumericKind::Float32), "IEEE"),
    sample_format(8, 1, Some(NumericKind::Int8), "8 bit Integer"),
];

/// Map a stored revision number onto 0 or 1.
///
/// 100 and 256 are both found in the wild for revision 1.
pub fn normalize_revision(raw: u16) -> Option<u16> {
    match raw {
        0 => Some(0),
        1 | 100 | 256 => Some(1),
        _ => None,
    }
}

/// Look up a `(revision, DataSampleFormat)` pair; `revision` may be a raw stored value
pub fn lookup_sample_format(revision: u16, format: i16) -> Result<&'static SampleFormat> {
    let unsupported = SegyError::UnsupportedDataSampleFormat { revision, format };
    let table = match normalize_revision(revision) {
        Some(0) => REVISION_0_FORMATS,
        Some(_) => REVISION_1_FORMATS,
        None => return Err(unsupported),
    };
    table
        .iter()
        .find(|entry| entry.code == format)
        .ok_or(unsupported)
}

pub fn bytes_per_sample(revision: u16, format: i16) -> Result<usize> {
    Ok(lookup_sample_format(revision, format)?.bytes_per_sample)
}

pub fn numeric_kind_for(revision: u16, format: i16) -> Result<NumericKind> {
    lookup_sample_format(revision, format)?
        .kind
        .ok_or(SegyError::UnsupportedDataSampleFormat { revision, format })
}

/// Revision 1 DataSampleFormat code that stores `kind`
pub fn data_sample_format_for(kind: NumericKind) -> Result<i16> {
    REVISION_1_FORMATS
        .iter()
        .find(|entry| entry.kind == Some(kind))
        .map(|entry| entry.code)
        .ok_or_else(|| SegyError::UnsupportedNumericKind(format!("{} has no SEG-Y sample format", kind)))
}

/// Check every table row is self-consistent
pub fn validate_sample_formats() -> Result<()> {
    for (revision, table) in [(0u16, REVISION_0_FORMATS), (1u16, REVISION_1_FORMATS)] {
        for entry in table {
            if let Some(kind) = entry.kind {
                if kind.size_in_bytes() != entry.bytes_per_sample {
                    return Err(SegyError::Configuration(format!(
                        "revision {} format {}: {} is {} bytes, table says {}",
                        revision,
                        entry.code,
                        kind,
                        kind.size_in_bytes(),
                        entry.bytes_per_sample
                    )));
                }
            }
        }
    }
    Ok(())
}
