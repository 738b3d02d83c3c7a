//! Fixed minute buckets: `root/<receiver>/<YYYYMMDD>/<HH>/<MM>T.dat`
//!
//! Every receiver folder holding a file for the same calendar minute
//! contributes three traces (Y, X, Z columns) to that minute's SEG-Y file.

use super::{stamp_recording_time, write_options, Bucket, BucketOutcome, Skipped};
use crate::config::ConvertConfig;
use crate::container::{SegyContainer, CODE_CROSS_LINE, CODE_IN_LINE, CODE_VERTICAL};
use crate::error::{Result, SegyError};
use crate::raw;
use crate::segy;
use crate::utils::{output_path, parse_date_folder, sorted_entries};
use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{concatenate, Array2, Axis};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// TraceIdentificationCode cycle of the Y, X, Z columns
const COMPONENT_CODES: [i64; 3] = [CODE_IN_LINE, CODE_CROSS_LINE, CODE_VERTICAL];

/// Numeric receiver id: `prefix` followed by the (optionally truncated) folder name.
///
/// A name that is not a number falls back to the digits it contains, so `R1`
/// with prefix `4` is 41. Names without any digit yield `None`.
pub fn receiver_id(name: &str, prefix: &str, digits: Option<usize>) -> Option<i64> {
    let name: String = match digits {
        Some(n) => name.chars().take(n).collect(),
        None => name.to_string(),
    };
    if let Ok(id) = format!("{}{}", prefix, name).parse() {
        return Some(id);
    }
    let embedded: String = name.chars().filter(char::is_ascii_digit).collect();
    if embedded.is_empty() {
        return None;
    }
    format!("{}{}", prefix, embedded).parse().ok()
}

/// One receiver's file for a bucket
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverFile {
    pub receiver_id: i64,
    pub path: PathBuf,
}

/// All receiver files recorded during one calendar minute
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteBucket {
    pub at: NaiveDateTime,
    pub inputs: Vec<ReceiverFile>,
    pub output: PathBuf,
}

#[derive(Debug)]
struct Receiver {
    id: i64,
    path: PathBuf,
}

fn minute_file(receiver: &Path, date_folder: &str, hour: u32, minute: u32) -> PathBuf {
    receiver
        .join(date_folder)
        .join(format!("{:02}", hour))
        .join(format!("{:02}T.dat", minute))
}

/// Find every non-empty minute bucket under `root`, in ascending time order
pub fn plan(root: &Path, out_dir: &Path, config: &ConvertConfig) -> Result<Vec<MinuteBucket>> {
    let folders = sorted_entries(root, |p| p.is_dir()).map_err(|e| SegyError::from(e).at(root))?;

    let mut receivers = Vec::with_capacity(folders.len());
    for (position, (name, path)) in folders.into_iter().enumerate() {
        let id = match receiver_id(&name, &config.receiver_prefix, config.receiver_name_digits) {
            Some(id) => id,
            None => {
                let id = position as i64 + 1;
                warn!(path = %path.display(), id, "Receiver folder name has no digits, numbering by position");
                id
            }
        };
        receivers.push(Receiver { id, path });
    }

    let mut dates: BTreeSet<(NaiveDate, String)> = BTreeSet::new();
    for receiver in &receivers {
        match sorted_entries(&receiver.path, |p| p.is_dir()) {
            Ok(entries) => dates.extend(
                entries
                    .into_iter()
                    .filter_map(|(name, _)| parse_date_folder(&name).map(|date| (date, name))),
            ),
            Err(e) => warn!(path = %receiver.path.display(), error = %e, "Cannot list receiver folder"),
        }
    }
    debug!(receivers = receivers.len(), dates = dates.len(), "Scanned minute layout");

    let mut buckets = Vec::new();
    for (date, folder) in &dates {
        for hour in 0..24 {
            for minute in 0..60 {
                let inputs: Vec<ReceiverFile> = receivers
                    .iter()
                    .filter_map(|r| {
                        let path = minute_file(&r.path, folder, hour, minute);
                        path.is_file().then_some(ReceiverFile {
                            receiver_id: r.id,
                            path,
                        })
                    })
                    .collect();
                if inputs.is_empty() {
                    continue;
                }
                let Some(at) = date.and_hms_opt(hour, minute, 0) else {
                    continue;
                };
                buckets.push(MinuteBucket {
                    at,
                    inputs,
                    output: output_path(out_dir, at),
                });
            }
        }
    }
    Ok(buckets)
}

impl Bucket for MinuteBucket {
    fn label(&self) -> String {
        format!("{} ({} receivers)", self.at.format("%Y-%m-%d %H:%M"), self.inputs.len())
    }

    fn convert(self, config: &ConvertConfig) -> Result<BucketOutcome> {
        if config.skip_existing && self.output.exists() {
            info!(path = %self.output.display(), "Output exists, skipping");
            return Ok(BucketOutcome::Existing(self.output));
        }

        let mut skipped = Vec::new();
        let mut blocks: Vec<Array2<f64>> = Vec::with_capacity(self.inputs.len());
        let mut ids = Vec::with_capacity(self.inputs.len());

        for input in &self.inputs {
            let decoded = raw::load(&input.path).and_then(|data| {
                raw::decode_raw(&data, config.header_size, config.sample_format, config.raw_endian)
            });
            match decoded {
                Ok(columns) => {
                    if let Some(first) = blocks.first() {
                        if first.nrows() != columns.nrows() {
                            let reason = format!(
                                "{} samples per component, bucket has {}",
                                columns.nrows(),
                                first.nrows()
                            );
                            warn!(path = %input.path.display(), %reason, "Skipping raw file");
                            skipped.push(Skipped::new(&input.path, reason));
                            continue;
                        }
                    }
                    debug!(path = %input.path.display(), samples = columns.nrows(), "Decoded raw file");
                    blocks.push(columns);
                    ids.push(input.receiver_id);
                }
                Err(e) if e.is_fatal() => return Err(e.at(&input.path)),
                Err(e) => {
                    warn!(path = %input.path.display(), error = %e, "Skipping raw file");
                    skipped.push(Skipped::new(&input.path, e.to_string()));
                }
            }
        }

        if blocks.is_empty() {
            warn!(bucket = %self.at, "No usable inputs in bucket");
            return Ok(BucketOutcome::Empty { skipped });
        }

        let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
        let data = concatenate(Axis(1), &views).map_err(|e| SegyError::ShapeMismatch(e.to_string()))?;
        let ntraces = data.ncols();

        let mut container = SegyContainer::from_traces(data, config.dt)?;
        container.set_trace_column(
            "TraceIdentificationCode",
            (0..ntraces).map(|i| COMPONENT_CODES[i % 3]).collect(),
        )?;
        container.set_trace_column(
            &config.receiver_field,
            ids.iter().flat_map(|&id| [id; 3]).collect(),
        )?;
        stamp_recording_time(&mut container, self.at)?;

        segy::write_file(&container, &self.output, &write_options(config))?;
        Ok(BucketOutcome::Written {
            path: self.output,
            ntraces,
            skipped,
        })
    }
}
