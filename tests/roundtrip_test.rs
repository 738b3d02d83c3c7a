//! SEG-Y write/read integration tests

use ndarray::Array2;
use segyconv::container::{ComponentMode, ComponentOrder, TimeBase};
use segyconv::segy::{self, ReadOptions, WriteOptions};
use segyconv::{trace_schema, NumericKind, SegyContainer};
use tempfile::TempDir;

/// Seeded xorshift generator
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn range(&mut self, lo: i64, hi: i64) -> i64 {
        lo + (self.next() % (hi - lo + 1) as u64) as i64
    }
}

fn kind_range(kind: NumericKind) -> Option<(i64, i64)> {
    match kind {
        NumericKind::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
        NumericKind::UInt8 => Some((0, u8::MAX as i64)),
        NumericKind::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
        NumericKind::UInt16 => Some((0, u16::MAX as i64)),
        NumericKind::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
        NumericKind::UInt32 => Some((0, u32::MAX as i64)),
        _ => None,
    }
}

/// Random samples representable in `format`, random values in every trace header column
fn random_container(rng: &mut Rng, format: i16) -> SegyContainer {
    let ns = rng.range(1, 300) as usize;
    let ntraces = rng.range(1, 12) as usize;
    let data = Array2::from_shape_simple_fn((ns, ntraces), || match format {
        2 => rng.range(i32::MIN as i64, i32::MAX as i64) as f64,
        3 => rng.range(i16::MIN as i64, i16::MAX as i64) as f64,
        8 => rng.range(i8::MIN as i64, i8::MAX as i64) as f64,
        _ => rng.range(-1_000_000, 1_000_000) as f64 / 64.0,
    });
    let mut container = SegyContainer::from_traces(data, 1000).unwrap();
    for field in trace_schema().scalar_fields() {
        // the writer always stores the matrix's own sample count
        if field.name == "ns" {
            continue;
        }
        if let Some((lo, hi)) = kind_range(field.kind) {
            let values = (0..ntraces).map(|_| rng.range(lo, hi)).collect();
            container.set_trace_column(field.name, values).unwrap();
        }
    }
    container
}

/// Interpret a written file as Rev 0 IBM float with every sample set to `ibm`
fn as_revision_zero_ibm(bytes: &mut [u8], ns: usize, ntraces: usize, ibm: [u8; 4]) {
    bytes[3224..3226].copy_from_slice(&1i16.to_be_bytes());
    bytes[3500..3502].copy_from_slice(&0u16.to_be_bytes());
    for trace in 0..ntraces {
        let start = 3600 + trace * (240 + ns * 4) + 240;
        for sample in bytes[start..start + ns * 4].chunks_exact_mut(4) {
            sample.copy_from_slice(&ibm);
        }
    }
}

fn three_component(receivers: usize, ns: usize) -> SegyContainer {
    let data = Array2::from_shape_fn((ns, receivers * 3), |(i, j)| ((i % 50) as f64) - 25.0 + j as f64);
    let mut container = SegyContainer::from_traces(data, 1000).unwrap();
    container
        .set_trace_identification_code(ComponentMode::Three, ComponentOrder::Zen)
        .unwrap();
    container
}

#[test]
fn test_every_writable_format_survives_a_file() {
    let dir = TempDir::new().unwrap();
    let original = three_component(2, 120);

    for format in [2i16, 3, 5, 8] {
        let path = dir.path().join(format!("dsf{}.sgy", format));
        segy::write_file(
            &original,
            &path,
            &WriteOptions::default().with_data_sample_format(format),
        )
        .unwrap();

        let expected_len = 3600 + 6 * (240 + 120 * segyconv::schema::bytes_per_sample(1, format).unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, expected_len);

        let back = segy::read_file(&path, &ReadOptions::default()).unwrap();
        assert_eq!(back.volume_header().data_sample_format(), format);
        assert_eq!(back.traces(), original.traces(), "format {}", format);
        assert_eq!(back.trace_header(), original.trace_header());
        if format == 5 {
            assert_eq!(back.volume_header(), original.volume_header());
        }
        assert_eq!(back.component_order(), ComponentOrder::Zen);
        assert_eq!(back.component_count(), 3);
    }
}

#[test]
fn test_random_matrices_and_headers_survive_every_format() {
    let mut rng = Rng(0x5E6_1975);
    for format in [2i16, 3, 5, 8] {
        for _ in 0..4 {
            let original = random_container(&mut rng, format);
            let bytes = segy::write_bytes(&original, &WriteOptions::default().with_data_sample_format(format)).unwrap();
            let back = segy::read_bytes(&bytes, &ReadOptions::default()).unwrap();
            assert_eq!(back.volume_header().data_sample_format(), format);
            assert_eq!(back.traces(), original.traces(), "format {}", format);
            assert_eq!(back.trace_header(), original.trace_header(), "format {}", format);
            assert_eq!(back.component_order(), original.component_order());
        }
    }
}

#[test]
fn test_revision_zero_file_reads_writes_and_reads_again() {
    let dir = TempDir::new().unwrap();
    let (ns, ntraces) = (30, 6);
    let mut bytes = segy::write_bytes(&three_component(2, ns), &WriteOptions::default()).unwrap();
    // IBM -100.0
    as_revision_zero_ibm(&mut bytes, ns, ntraces, [0xC2, 0x64, 0x00, 0x00]);
    let legacy = dir.path().join("legacy.sgy");
    std::fs::write(&legacy, &bytes).unwrap();

    let first = segy::read_file(&legacy, &ReadOptions::default()).unwrap();
    assert_eq!(first.volume_header().revision(), Some(0));
    assert!(first.traces().iter().all(|&v| v == -100.0));

    let copy = dir.path().join("copy.sgy");
    segy::write_file(&first, &copy, &WriteOptions::default()).unwrap();
    let second = segy::read_file(&copy, &ReadOptions::default()).unwrap();
    assert_eq!(second.volume_header().data_sample_format(), segy::DSF_IEEE);
    assert_eq!(second.volume_header().revision(), Some(1));
    assert_eq!(second.traces(), first.traces());
    assert_eq!(second.trace_header(), first.trace_header());
    assert_eq!(second.component_order(), ComponentOrder::Zen);

    // integer Rev 0 formats keep their revision
    let mut int32 = segy::write_bytes(&three_component(1, 10), &WriteOptions::default().with_data_sample_format(2)).unwrap();
    int32[3500..3502].copy_from_slice(&0u16.to_be_bytes());
    let rev0 = segy::read_bytes(&int32, &ReadOptions::default()).unwrap();
    let rewritten = segy::write_bytes(&rev0, &WriteOptions::default()).unwrap();
    assert_eq!(rewritten, int32);
}

#[test]
fn test_merge_revision_zero_ibm_inputs() {
    let dir = TempDir::new().unwrap();
    let legacy = dir.path().join("legacy.sgy");
    let mut bytes = segy::write_bytes(&three_component(1, 20), &WriteOptions::default()).unwrap();
    // IBM 1.0
    as_revision_zero_ibm(&mut bytes, 20, 3, [0x41, 0x10, 0x00, 0x00]);
    std::fs::write(&legacy, &bytes).unwrap();
    let modern = dir.path().join("modern.sgy");
    segy::write_file(&three_component(1, 20), &modern, &WriteOptions::default()).unwrap();

    let out = dir.path().join("merged.sgy");
    let merged = segy::merge_to_file(
        &[&legacy, &modern],
        &out,
        &ReadOptions::default(),
        &WriteOptions::default().with_data_sample_format(segy::DSF_IEEE),
    )
    .unwrap();
    assert_eq!(merged.ntraces(), 6);

    let back = segy::read_file(&out, &ReadOptions::default()).unwrap();
    assert_eq!(back.volume_header().revision(), Some(1));
    assert_eq!(back.traces()[[7, 2]], 1.0);
    assert_eq!(back.traces()[[7, 3]], three_component(1, 20).traces()[[7, 0]]);
}

#[test]
fn test_component_views() {
    let c = three_component(2, 10);
    assert_eq!(c.z_traces().ncols(), 2);
    assert_eq!(c.z_traces()[[0, 1]], c.traces()[[0, 3]]);
    assert_eq!(c.x_traces().unwrap()[[0, 0]], c.traces()[[0, 1]]);
    assert_eq!(c.y_traces().unwrap()[[0, 1]], c.traces()[[0, 5]]);
}

#[test]
fn test_merge_renumbers_traces() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.sgy");
    let b = dir.path().join("b.sgy");
    let c = dir.path().join("short.sgy");
    segy::write_file(&three_component(1, 100), &a, &WriteOptions::default()).unwrap();
    segy::write_file(&three_component(1, 100), &b, &WriteOptions::default()).unwrap();
    segy::write_file(&three_component(1, 80), &c, &WriteOptions::default()).unwrap();

    let out = dir.path().join("merged.sgy");
    let merged = segy::merge_to_file(
        &[&a, &c, &b],
        &out,
        &ReadOptions::default(),
        &WriteOptions::default(),
    )
    .unwrap();
    assert_eq!(merged.ntraces(), 6);

    let back = segy::read_file(&out, &ReadOptions::default()).unwrap();
    assert_eq!(
        back.trace_header().column("TraceNumber").unwrap(),
        &[1, 2, 3, 4, 5, 6]
    );
    assert_eq!(back.volume_header().ntraces(), 6);
    assert_eq!(back.component_order(), ComponentOrder::Zen);
}

#[test]
fn test_recording_time_from_trace_header() {
    let mut c = three_component(1, 10);
    for (name, value) in [
        ("YearDataRecorded", 2019),
        ("DayOfYear", 315),
        ("HourOfDay", 10),
        ("MinuteOfHour", 5),
        ("SecondOfMinute", 0),
        ("TimeBaseCode", 4),
    ] {
        c.set_trace_column(name, vec![value; 3]).unwrap();
    }
    let bytes = segy::write_bytes(&c, &WriteOptions::default()).unwrap();
    let back = segy::read_bytes(&bytes, &ReadOptions::default()).unwrap();
    assert_eq!(
        back.recorded_at().unwrap().to_string(),
        "2019-11-11 10:05:00"
    );
    assert_eq!(back.time_base(), TimeBase::Utc);
    assert_eq!(back.stats().df, 1000.0);
}

#[test]
fn test_header_field_scan_without_decoding_samples() {
    let c = three_component(3, 50);
    let bytes = segy::write_bytes(&c, &WriteOptions::default()).unwrap();
    let codes = segy::read_trace_header_field(&bytes, "TraceIdentificationCode", &ReadOptions::default()).unwrap();
    assert_eq!(codes, vec![12, 13, 14, 12, 13, 14, 12, 13, 14]);
    assert_eq!(
        segy::read_last_trace_header_field(&bytes, "TraceNumber", &ReadOptions::default()).unwrap(),
        Some(9)
    );
}
