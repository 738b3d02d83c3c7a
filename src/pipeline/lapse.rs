//! Time-lapse alignment of free-running single-channel recordings
//!
//! Each receiver records three files (`ch01` Z, `ch02` X, `ch03` Y) that
//! started at independent times. Every file is shifted by its lapse, the
//! number of samples it recorded before the latest start, so that all
//! columns share a time origin. The aligned matrix is then cut into
//! fixed-length windows, one SEG-Y file each.

use super::{stamp_recording_time, write_options, Bucket, BucketOutcome, Skipped};
use crate::config::ConvertConfig;
use crate::container::{ComponentMode, ComponentOrder, SegyContainer};
use crate::error::{Result, SegyError};
use crate::raw::{self, Channel, RawChannelFile};
use crate::segy;
use crate::utils::output_path;
use bytes::Bytes;
use chrono::{Duration, NaiveDateTime};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Channels in matrix order
const CHANNELS: [Channel; 3] = [Channel::Z, Channel::X, Channel::Y];

/// Every `.dat` file below `root`, sorted
pub fn find_recordings(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("dat"))
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Samples recorded before `latest`, at `dt` microseconds per sample
pub fn lapse_samples(started_at: NaiveDateTime, latest: NaiveDateTime, dt: u32) -> usize {
    let micros = (latest - started_at).num_microseconds().unwrap_or(0).max(0);
    (micros as f64 / dt as f64).round() as usize
}

/// The three channel files of one receiver
#[derive(Debug, Clone)]
struct ReceiverFiles {
    id: i64,
    files: [RawChannelFile; 3],
}

/// Aligned recording of every complete receiver
#[derive(Debug, Clone)]
pub struct LapsePlan {
    /// Z traces of every receiver, then X, then Y; `None` when nothing aligned
    pub aligned: Option<Arc<SegyContainer>>,
    /// Time of the first aligned sample
    pub started_at: Option<NaiveDateTime>,
    /// Receiver ids in trace order within each component
    pub receivers: Vec<i64>,
    /// Files left out while planning
    pub skipped: Vec<Skipped>,
}

impl LapsePlan {
    fn empty(skipped: Vec<Skipped>) -> Self {
        Self {
            aligned: None,
            started_at: None,
            receivers: Vec::new(),
            skipped,
        }
    }

    /// Samples per aligned trace
    pub fn common_length(&self) -> usize {
        self.aligned.as_ref().map_or(0, |c| c.ns())
    }

    /// Cut the aligned recording into windows
    pub fn into_buckets(&self, out_dir: &Path, config: &ConvertConfig) -> Vec<LapseBucket> {
        let (Some(aligned), Some(started_at)) = (&self.aligned, self.started_at) else {
            return Vec::new();
        };
        let window = config.window_samples(aligned.dt());
        let count = config.window.policy.window_count(aligned.ns(), window);
        let remainder = aligned.ns() - count * window;
        if remainder > 0 {
            debug!(remainder, "Samples left after the last window");
        }

        (0..count)
            .map(|i| {
                let at = started_at + Duration::seconds(i as i64 * config.window.seconds as i64);
                LapseBucket {
                    aligned: aligned.clone(),
                    range: i * window..(i + 1) * window,
                    at,
                    output: output_path(out_dir, at),
                }
            })
            .collect()
    }
}

/// One window of an aligned recording
#[derive(Debug, Clone)]
pub struct LapseBucket {
    pub aligned: Arc<SegyContainer>,
    pub range: Range<usize>,
    pub at: NaiveDateTime,
    pub output: PathBuf,
}

impl Bucket for LapseBucket {
    fn label(&self) -> String {
        format!("{} (samples {}..{})", self.at.format("%Y-%m-%d %H:%M:%S"), self.range.start, self.range.end)
    }

    fn convert(self, config: &ConvertConfig) -> Result<BucketOutcome> {
        if config.skip_existing && self.output.exists() {
            info!(path = %self.output.display(), "Output exists, skipping");
            return Ok(BucketOutcome::Existing(self.output));
        }
        let mut window = self.aligned.select_samples(self.range.clone())?;
        stamp_recording_time(&mut window, self.at)?;
        segy::write_file(&window, &self.output, &write_options(config))?;
        Ok(BucketOutcome::Written {
            ntraces: window.ntraces(),
            path: self.output,
            skipped: Vec::new(),
        })
    }
}

fn group_receivers(files: Vec<RawChannelFile>, skipped: &mut Vec<Skipped>) -> Vec<ReceiverFiles> {
    let mut by_receiver: BTreeMap<i64, [Option<RawChannelFile>; 3]> = BTreeMap::new();
    for file in files {
        let slot = &mut by_receiver.entry(file.receiver_id).or_default()[file.channel.index() as usize - 1];
        if let Some(previous) = slot {
            warn!(path = %file.path.display(), kept = %previous.path.display(), "Duplicate channel file");
            skipped.push(Skipped::new(&file.path, "duplicate channel"));
            continue;
        }
        *slot = Some(file);
    }

    let mut complete = Vec::with_capacity(by_receiver.len());
    for (id, slots) in by_receiver {
        match slots {
            [Some(z), Some(x), Some(y)] => complete.push(ReceiverFiles { id, files: [z, x, y] }),
            partial => {
                warn!(receiver = id, "Receiver is missing a channel, skipping");
                for file in partial.into_iter().flatten() {
                    skipped.push(Skipped::new(&file.path, "receiver is missing a channel"));
                }
            }
        }
    }
    complete
}

/// A complete receiver with its three recordings in memory
struct LoadedReceiver {
    id: i64,
    files: [RawChannelFile; 3],
    data: [Bytes; 3],
}

impl LoadedReceiver {
    fn load(receiver: ReceiverFiles) -> Result<Self> {
        let [z, x, y] = &receiver.files;
        let data = [raw::load(&z.path)?, raw::load(&x.path)?, raw::load(&y.path)?];
        Ok(Self {
            id: receiver.id,
            files: receiver.files,
            data,
        })
    }

    fn recordings(&self) -> impl Iterator<Item = (&RawChannelFile, &Bytes)> {
        self.files.iter().zip(&self.data)
    }
}

/// Discover, group and align every recording below `root`
pub fn plan(root: &Path, config: &ConvertConfig) -> Result<LapsePlan> {
    let mut skipped = Vec::new();

    let mut files = Vec::new();
    for path in find_recordings(root).map_err(|e| SegyError::from(e).at(root))? {
        match RawChannelFile::from_path(&path) {
            Ok(file) => files.push(file),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unrecognized recording");
                skipped.push(Skipped::new(&path, e.to_string()));
            }
        }
    }
    let receivers = group_receivers(files, &mut skipped);
    if receivers.is_empty() {
        warn!(root = %root.display(), "No complete receiver found");
    }
    align(receivers, config, skipped)
}

/// Load every receiver, then align the readable ones to their latest start
fn align(receivers: Vec<ReceiverFiles>, config: &ConvertConfig, mut skipped: Vec<Skipped>) -> Result<LapsePlan> {
    let lapse = &config.lapse;
    let bps = lapse.sample_format.size_in_bytes();

    let mut loaded = Vec::with_capacity(receivers.len());
    for receiver in receivers {
        let (id, paths) = (receiver.id, receiver.files.clone());
        match LoadedReceiver::load(receiver) {
            Ok(receiver) => loaded.push(receiver),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(receiver = id, error = %e, "Skipping unreadable receiver");
                for file in &paths {
                    skipped.push(Skipped::new(&file.path, e.to_string()));
                }
            }
        }
    }

    let Some(latest) = loaded
        .iter()
        .flat_map(|r| r.files.iter().map(|f| f.started_at))
        .max()
    else {
        return Ok(LapsePlan::empty(skipped));
    };

    let usable = loaded
        .iter()
        .flat_map(|r| r.recordings())
        .map(|(file, buf)| {
            raw::sample_count(buf.len() as u64, lapse.header_size, bps)
                .saturating_sub(lapse_samples(file.started_at, latest, config.dt))
        })
        .min()
        .unwrap_or(0);
    let common = usable.saturating_sub(lapse.safety_margin);
    info!(receivers = loaded.len(), %latest, usable, common, "Aligned time-lapse recordings");
    if common == 0 {
        warn!(usable, margin = lapse.safety_margin, "Aligned recordings are shorter than the safety margin");
        return Ok(LapsePlan::empty(skipped));
    }

    let mut columns: [Vec<Vec<f64>>; 3] = Default::default();
    let mut ids = Vec::with_capacity(loaded.len());
    for receiver in &loaded {
        for (channel, (column, (file, buf))) in CHANNELS.iter().zip(columns.iter_mut().zip(receiver.recordings())) {
            debug_assert_eq!(*channel, file.channel);
            let offset = lapse_samples(file.started_at, latest, config.dt);
            let trace = raw::read_channel(buf, lapse.header_size, lapse.sample_format, lapse.endian, offset, common)
                .map_err(|e| e.at(&file.path))?;
            column.push(trace);
        }
        ids.push(receiver.id);
    }

    let traces: Vec<&Vec<f64>> = columns.iter().flatten().collect();
    let data = Array2::from_shape_fn((common, traces.len()), |(i, j)| traces[j][i]);
    let mut aligned = SegyContainer::from_traces(data, config.dt)?;
    aligned.set_trace_identification_code(ComponentMode::Three, ComponentOrder::Grouped)?;
    aligned.set_trace_column(&config.receiver_field, ids.repeat(CHANNELS.len()))?;

    Ok(LapsePlan {
        aligned: Some(Arc::new(aligned)),
        started_at: Some(latest),
        receivers: ids,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 12, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    /// Channel file whose sample i holds `base + i`
    fn write_channel(dir: &Path, receiver: &str, channel: u8, stamp: &str, samples: usize, base: i32) {
        let mut bytes = vec![0u8; 2048];
        for i in 0..samples {
            bytes.extend((base + i as i32).to_le_bytes());
        }
        let name = format!("{}_rec_{}_ch{:02}.dat", receiver, stamp, channel);
        std::fs::write(dir.join(name), bytes).unwrap();
    }

    fn small_config() -> ConvertConfig {
        let mut config = ConvertConfig::default();
        config.lapse.safety_margin = 10;
        config.window.seconds = 1;
        config
    }

    #[test]
    fn test_lapse_samples() {
        assert_eq!(lapse_samples(at(10, 0, 0), at(10, 0, 2), 1000), 2000);
        assert_eq!(lapse_samples(at(10, 0, 2), at(10, 0, 2), 1000), 0);
        assert_eq!(lapse_samples(at(10, 0, 0), at(10, 0, 1), 3000), 333);
    }

    #[test]
    fn test_plan_aligns_to_latest_start() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("site");
        std::fs::create_dir_all(&nested).unwrap();
        for ch in 1..=3 {
            write_channel(dir.path(), "7", ch, "20181201_100000", 3000, ch as i32 * 100_000);
            write_channel(&nested, "8", ch, "20181201_100001", 2500, ch as i32 * 200_000);
        }

        let plan = plan(dir.path(), &small_config()).unwrap();
        assert_eq!(plan.started_at, Some(at(10, 0, 1)));
        assert_eq!(plan.receivers, vec![7, 8]);
        // receiver 7 lapses 1000 samples: min(2000, 2500) - 10
        assert_eq!(plan.common_length(), 1990);

        let aligned = plan.aligned.unwrap();
        assert_eq!(aligned.ntraces(), 6);
        assert_eq!(aligned.component_order(), ComponentOrder::Grouped);
        assert_eq!(aligned.traces()[[0, 0]], 101_000.0);
        assert_eq!(aligned.traces()[[0, 1]], 200_000.0);
        assert_eq!(aligned.traces()[[0, 2]], 201_000.0);
        assert_eq!(aligned.traces()[[5, 5]], 600_005.0);
        assert_eq!(
            aligned.trace_header().column("Inline3D").unwrap(),
            &[7, 8, 7, 8, 7, 8]
        );
    }

    #[test]
    fn test_incomplete_receiver_is_skipped() {
        let dir = TempDir::new().unwrap();
        for ch in 1..=3 {
            write_channel(dir.path(), "7", ch, "20181201_100000", 100, 0);
        }
        write_channel(dir.path(), "9", 1, "20181201_100000", 100, 0);
        std::fs::write(dir.path().join("notes.dat"), b"x").unwrap();

        let plan = plan(dir.path(), &small_config()).unwrap();
        assert_eq!(plan.receivers, vec![7]);
        assert_eq!(plan.skipped.len(), 2);
    }

    #[test]
    fn test_unreadable_receiver_does_not_shape_alignment() {
        let dir = TempDir::new().unwrap();
        for ch in 1..=3 {
            write_channel(dir.path(), "7", ch, "20181201_100000", 3000, 0);
        }
        let mut skipped = Vec::new();
        let files = find_recordings(dir.path())
            .unwrap()
            .iter()
            .map(|p| RawChannelFile::from_path(p).unwrap())
            .collect();
        let mut receivers = group_receivers(files, &mut skipped);

        // a later, longer receiver whose files vanished after discovery
        let gone = |channel| RawChannelFile {
            path: dir.path().join(format!("9_rec_20181201_100002_ch0{}.dat", channel)),
            receiver: "9".to_string(),
            receiver_id: 9,
            channel: Channel::from_index(channel).unwrap(),
            started_at: at(10, 0, 2),
            size: 2048 + 4 * 10_000,
        };
        receivers.push(ReceiverFiles {
            id: 9,
            files: [gone(1), gone(2), gone(3)],
        });

        let plan = align(receivers, &small_config(), skipped).unwrap();
        assert_eq!(plan.started_at, Some(at(10, 0, 0)));
        assert_eq!(plan.receivers, vec![7]);
        assert_eq!(plan.common_length(), 2990);
        assert_eq!(plan.skipped.len(), 3);
        assert!(plan.skipped.iter().all(|s| s.path.to_string_lossy().contains("9_rec_")));
    }

    #[test]
    fn test_windows_follow_policy() {
        let dir = TempDir::new().unwrap();
        for ch in 1..=3 {
            write_channel(dir.path(), "7", ch, "20181201_235959", 3010, 0);
        }
        let config = small_config();
        let plan = plan(dir.path(), &config).unwrap();
        assert_eq!(plan.common_length(), 3000);

        let out = TempDir::new().unwrap();
        let buckets = plan.into_buckets(out.path(), &config);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[1].range, 1000..2000);
        assert_eq!(
            buckets[1].output.file_name().unwrap().to_str().unwrap(),
            "20181202_000000.sgy"
        );

        let outcome = buckets[1].clone().convert(&config).unwrap();
        let back = segy::read_file(&buckets[1].output, &segy::ReadOptions::default()).unwrap();
        assert!(matches!(outcome, BucketOutcome::Written { ntraces: 3, .. }));
        assert_eq!(back.ns(), 1000);
        assert_eq!(back.traces()[[0, 0]], 1000.0);
        assert_eq!(back.trace_header().get("DayOfYear", 0), Some(336));
        assert_eq!(back.trace_header().get("HourOfDay", 0), Some(0));

        let complete = config.with_window_policy(crate::config::WindowPolicy::CompleteOnly);
        assert_eq!(plan.into_buckets(out.path(), &complete).len(), 3);
    }

    #[test]
    fn test_too_short_for_margin() {
        let dir = TempDir::new().unwrap();
        for ch in 1..=3 {
            write_channel(dir.path(), "7", ch, "20181201_100000", 5, 0);
        }
        let plan = plan(dir.path(), &small_config()).unwrap();
        assert!(plan.aligned.is_none());
        assert!(plan.into_buckets(Path::new("/unused"), &small_config()).is_empty());
    }
}
