//! SEG-Y reading, writing and merging
//!
//! A file is the 3200-byte textual header, the 400-byte binary header, then
//! `ntraces` blocks of a 240-byte trace header followed by `ns * bps` sample
//! bytes. Everything is read into memory at once.

use crate::codec;
use crate::container::SegyContainer;
use crate::error::{Result, SegyError};
use crate::header::{TraceHeaderTable, VolumeHeader};
use crate::schema::{self, trace_schema, volume_schema, FieldDescriptor, TEXTUAL_HEADER_BYTES, TRACE_HEADER_BYTES, VOLUME_HEADER_SPAN};
use crate::types::{Endian, NumericKind, Value};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// DataSampleFormat code of IBM float
pub const DSF_IBM: i16 = 1;
/// DataSampleFormat code of IEEE float
pub const DSF_IEEE: i16 = 5;

/// Overrides applied while reading
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Force the revision instead of trusting the binary header
    pub revision: Option<u16>,
    /// Force the sample format instead of trusting the binary header
    pub data_sample_format: Option<i16>,
    pub endian: Endian,
}

impl ReadOptions {
    pub fn with_revision(mut self, revision: u16) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_data_sample_format(mut self, format: i16) -> Self {
        self.data_sample_format = Some(format);
        self
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }
}

/// Options applied while writing
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Sample format to write; the container's own format when unset
    pub data_sample_format: Option<i16>,
    /// ASCII text for the textual header, space padded
    pub textual_header: Option<String>,
    pub endian: Endian,
}

impl WriteOptions {
    pub fn with_data_sample_format(mut self, format: i16) -> Self {
        self.data_sample_format = Some(format);
        self
    }

    pub fn with_textual_header(mut self, text: impl Into<String>) -> Self {
        self.textual_header = Some(text.into());
        self
    }
}

/// Sample layout resolved from a volume header
#[derive(Debug, Clone, Copy)]
struct TraceLayout {
    ns: usize,
    bps: usize,
    kind: NumericKind,
}

impl TraceLayout {
    fn block(&self) -> usize {
        TRACE_HEADER_BYTES + self.ns * self.bps
    }

    fn trace_offset(&self, index: usize) -> usize {
        VOLUME_HEADER_SPAN + index * self.block()
    }
}

fn read_volume_header(bytes: &[u8], options: &ReadOptions) -> Result<VolumeHeader> {
    if bytes.len() < VOLUME_HEADER_SPAN {
        return Err(SegyError::BufferTooShort {
            offset: 0,
            needed: VOLUME_HEADER_SPAN,
            len: bytes.len(),
        });
    }
    let mut volume = VolumeHeader::new();
    for field in volume_schema().scalar_fields() {
        let value = codec::decode_scalar(bytes, field.offset, field.kind, options.endian)?;
        volume.set(field.name, value.as_i64())?;
    }
    if let Some(revision) = options.revision {
        volume.set("SegyFormatRevisionNumber", revision as i64)?;
    }
    if let Some(format) = options.data_sample_format {
        volume.set("DataSampleFormat", format as i64)?;
    }
    Ok(volume)
}

fn resolve_layout(bytes: &[u8], volume: &mut VolumeHeader) -> Result<(TraceLayout, usize)> {
    let revision = volume.revision_raw();
    let format = volume.data_sample_format();
    let bps = schema::bytes_per_sample(revision, format)?;
    let kind = schema::numeric_kind_for(revision, format)?;
    let layout = TraceLayout {
        ns: volume.ns(),
        bps,
        kind,
    };

    let body = bytes.len() - VOLUME_HEADER_SPAN;
    if body % layout.block() != 0 {
        return Err(SegyError::TruncatedFile {
            size: bytes.len(),
            block: layout.block(),
        });
    }
    let ntraces = body / layout.block();
    volume.set_ntraces(ntraces);
    Ok((layout, ntraces))
}

/// Parse a complete SEG-Y byte stream
pub fn read_bytes(bytes: &[u8], options: &ReadOptions) -> Result<SegyContainer> {
    let mut volume = read_volume_header(bytes, options)?;
    let (layout, ntraces) = resolve_layout(bytes, &mut volume)?;
    debug!(
        ns = layout.ns,
        ntraces,
        kind = %layout.kind,
        revision = volume.revision_raw(),
        "Reading SEG-Y traces"
    );

    let fields: Vec<&FieldDescriptor> = trace_schema().scalar_fields().collect();
    let mut columns: Vec<Vec<i64>> = vec![Vec::with_capacity(ntraces); fields.len()];
    let mut traces = Array2::<f64>::zeros((layout.ns, ntraces));
    let mut samples = vec![0.0f64; layout.ns];

    for index in 0..ntraces {
        let base = layout.trace_offset(index);
        for (field, column) in fields.iter().zip(columns.iter_mut()) {
            let value = codec::decode_scalar(bytes, base + field.offset, field.kind, options.endian)?;
            column.push(value.as_i64());
        }
        codec::decode_f64_into(bytes, base + TRACE_HEADER_BYTES, layout.kind, options.endian, &mut samples)?;
        for (slot, sample) in traces.column_mut(index).iter_mut().zip(samples.iter()) {
            *slot = *sample;
        }
    }

    let columns: BTreeMap<String, Vec<i64>> = fields
        .iter()
        .map(|f| f.name.to_string())
        .zip(columns)
        .collect();
    let headers = TraceHeaderTable::from_columns(ntraces, columns)?;
    SegyContainer::new(traces, volume, headers)
}

/// Read a SEG-Y file from disk
pub fn read_file(path: impl AsRef<Path>, options: &ReadOptions) -> Result<SegyContainer> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| SegyError::from(e).at(path))?;
    read_bytes(&bytes, options).map_err(|e| e.at(path))
}

/// Read only the binary volume header, with `ntraces` derived from the length
pub fn read_volume_header_bytes(bytes: &[u8], options: &ReadOptions) -> Result<VolumeHeader> {
    let mut volume = read_volume_header(bytes, options)?;
    resolve_layout(bytes, &mut volume)?;
    Ok(volume)
}

/// Values of one trace header field across every trace
pub fn read_trace_header_field(bytes: &[u8], name: &str, options: &ReadOptions) -> Result<Vec<i64>> {
    let field = trace_schema().field(name)?;
    let mut volume = read_volume_header(bytes, options)?;
    let (layout, ntraces) = resolve_layout(bytes, &mut volume)?;
    (0..ntraces)
        .map(|index| {
            codec::decode_scalar(bytes, layout.trace_offset(index) + field.offset, field.kind, options.endian)
                .map(|v| v.as_i64())
        })
        .collect()
}

/// Value of one trace header field on the last trace
pub fn read_last_trace_header_field(bytes: &[u8], name: &str, options: &ReadOptions) -> Result<Option<i64>> {
    let field = trace_schema().field(name)?;
    let mut volume = read_volume_header(bytes, options)?;
    let (layout, ntraces) = resolve_layout(bytes, &mut volume)?;
    match ntraces.checked_sub(1) {
        Some(last) => {
            let value = codec::decode_scalar(bytes, layout.trace_offset(last) + field.offset, field.kind, options.endian)?;
            Ok(Some(value.as_i64()))
        }
        None => Ok(None),
    }
}

fn textual_header_bytes(text: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = text
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .take(TEXTUAL_HEADER_BYTES)
        .collect();
    bytes.resize(TEXTUAL_HEADER_BYTES, b' ');
    bytes
}

/// Serialize a container to SEG-Y bytes.
///
/// IBM float cannot be encoded; an IBM container is written as IEEE float.
pub fn write_bytes(container: &SegyContainer, options: &WriteOptions) -> Result<Vec<u8>> {
    let volume = container.volume_header();
    let mut format = options
        .data_sample_format
        .unwrap_or_else(|| volume.data_sample_format());
    if format == DSF_IBM {
        warn!("IBM float output is not supported, writing IEEE float instead");
        format = DSF_IEEE;
    }
    // formats the stored revision cannot express are written as Rev 1
    let revision = match volume.revision() {
        Some(_) if schema::lookup_sample_format(volume.revision_raw(), format).is_ok() => volume.revision_raw(),
        _ => 100,
    };
    let layout = TraceLayout {
        ns: container.ns(),
        bps: schema::bytes_per_sample(revision, format)?,
        kind: schema::numeric_kind_for(revision, format)?,
    };
    let ntraces = container.ntraces();
    let endian = options.endian;

    let mut buf = vec![0u8; VOLUME_HEADER_SPAN + ntraces * layout.block()];
    if let Some(text) = &options.textual_header {
        buf[..TEXTUAL_HEADER_BYTES].copy_from_slice(&textual_header_bytes(text));
    }

    for field in volume_schema().scalar_fields() {
        let value = match field.name {
            "ns" => layout.ns as i64,
            "DataSampleFormat" => format as i64,
            "SegyFormatRevisionNumber" => revision as i64,
            name => volume.get(name).unwrap_or(field.default),
        };
        codec::encode_into(&mut buf, field.offset, Value::Int(value), field.kind, endian)?;
    }

    let headers = container.trace_header();
    let columns: Vec<(&FieldDescriptor, Option<&[i64]>)> = trace_schema()
        .scalar_fields()
        .map(|f| (f, headers.column(f.name)))
        .collect();

    for (index, trace) in container.traces().columns().into_iter().enumerate() {
        let base = layout.trace_offset(index);
        for (field, column) in &columns {
            let value = match (field.name, column) {
                ("ns", _) => layout.ns as i64,
                (_, Some(values)) => values[index],
                (_, None) => field.default,
            };
            codec::encode_into(&mut buf, base + field.offset, Value::Int(value), field.kind, endian)?;
        }
        codec::encode_f64_into(&mut buf, base + TRACE_HEADER_BYTES, trace.iter().copied(), layout.kind, endian)?;
    }
    Ok(buf)
}

/// Sibling temporary path used while an output is being written
pub fn temporary_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
}

/// Write `bytes` to a temporary sibling and rename it over `path`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = temporary_path(path);
    let result = std::fs::write(&temp, bytes).and_then(|_| std::fs::rename(&temp, path));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp);
        return Err(SegyError::from(e).at(path));
    }
    Ok(())
}

/// Write a container to disk; no partial file is left behind on failure
pub fn write_file(container: &SegyContainer, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
    let path = path.as_ref();
    let bytes = write_bytes(container, options).map_err(|e| e.at(path))?;
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote SEG-Y file");
    Ok(())
}

fn merge_labeled<I>(containers: I) -> Result<SegyContainer>
where
    I: IntoIterator<Item = (String, SegyContainer)>,
{
    let mut accepted: Vec<SegyContainer> = Vec::new();
    for (label, container) in containers {
        if let Some(first) = accepted.first() {
            let expected = (first.ns(), first.component_count());
            let found = (container.ns(), container.component_count());
            if expected != found {
                warn!(
                    input = %label,
                    expected_ns = expected.0,
                    expected_components = expected.1,
                    ns = found.0,
                    components = found.1,
                    "Skipping input with mismatched shape"
                );
                continue;
            }
        }
        accepted.push(container);
    }

    let mut iter = accepted.into_iter();
    let first = iter.next().ok_or(SegyError::NothingToMerge)?;
    let rest: Vec<SegyContainer> = iter.collect();
    if rest.is_empty() {
        let (traces, volume, mut headers) = first.into_parts();
        headers.renumber();
        return SegyContainer::new(traces, volume, headers);
    }

    let (first_traces, volume, mut headers) = first.into_parts();
    let mut views: Vec<ArrayView2<'_, f64>> = vec![first_traces.view()];
    views.extend(rest.iter().map(|c| c.traces().view()));
    let traces = concatenate(Axis(1), &views).map_err(|e| SegyError::ShapeMismatch(e.to_string()))?;
    for container in &rest {
        headers.append(container.trace_header());
    }
    headers.renumber();
    SegyContainer::new(traces, volume, headers)
}

/// Concatenate containers trace-wise.
///
/// Inputs whose `(ns, componentCount)` differ from the first are skipped.
pub fn merge_containers(containers: Vec<SegyContainer>) -> Result<SegyContainer> {
    merge_labeled(
        containers
            .into_iter()
            .enumerate()
            .map(|(i, c)| (format!("#{}", i), c)),
    )
}

/// Read and merge files; unreadable inputs are skipped unless the error is fatal
pub fn merge_files<P: AsRef<Path>>(paths: &[P], options: &ReadOptions) -> Result<SegyContainer> {
    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        match read_file(path, options) {
            Ok(container) => inputs.push((path.display().to_string(), container)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable input"),
        }
    }
    merge_labeled(inputs)
}

/// Merge files and write the result to `output`
pub fn merge_to_file<P: AsRef<Path>>(
    paths: &[P],
    output: impl AsRef<Path>,
    read_options: &ReadOptions,
    write_options: &WriteOptions,
) -> Result<SegyContainer> {
    let merged = merge_files(paths, read_options)?;
    write_file(&merged, output.as_ref(), write_options)?;
    info!(
        output = %output.as_ref().display(),
        ntraces = merged.ntraces(),
        "Merged SEG-Y files"
    );
    Ok(merged)
}
