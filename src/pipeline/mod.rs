//! Raw recording to SEG-Y conversion
//!
//! A run first plans its buckets (one output file each), then converts them
//! with at most `parallelism` in flight. Results are consumed in plan order,
//! so progress counts rise monotonically whatever the parallelism.
//!
//! Cancellation is cooperative: the token is checked before a bucket starts.
//! A bucket that has started always runs to completion or failure, and
//! outputs are renamed into place only once fully written.

pub mod lapse;
pub mod minute;
pub mod worker;

use crate::config::ConvertConfig;
use crate::container::SegyContainer;
use crate::error::{Result, SegyError};
use crate::segy::WriteOptions;
use crate::utils::day_of_year;
use chrono::{Datelike, NaiveDateTime, Timelike};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

pub use lapse::{LapseBucket, LapsePlan};
pub use minute::MinuteBucket;
pub use worker::{ConversionWorker, WorkerEvent, WorkerStatus};

/// Which input layout to convert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// `root/<receiver>/<YYYYMMDD>/<HH>/<MM>T.dat`, one file per receiver per minute
    Minute,
    /// Free-running single-channel files aligned by their start time
    Lapse,
}

/// Cooperative cancellation flag shared between a run and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An input left out of a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: String,
}

impl Skipped {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result of converting one bucket
#[derive(Debug, Clone, PartialEq)]
pub enum BucketOutcome {
    Written {
        path: PathBuf,
        ntraces: usize,
        skipped: Vec<Skipped>,
    },
    /// Output already present and `skip_existing` set
    Existing(PathBuf),
    /// Every input was skipped
    Empty { skipped: Vec<Skipped> },
}

impl BucketOutcome {
    pub fn skipped(&self) -> &[Skipped] {
        match self {
            BucketOutcome::Written { skipped, .. } | BucketOutcome::Empty { skipped } => skipped,
            BucketOutcome::Existing(_) => &[],
        }
    }
}

/// One unit of output
pub trait Bucket: Send + 'static {
    /// Human-readable name for progress reporting
    fn label(&self) -> String;

    /// Convert synchronously; errors returned here abort the run
    fn convert(self, config: &ConvertConfig) -> Result<BucketOutcome>;
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub total: usize,
    pub written: Vec<PathBuf>,
    pub existing: usize,
    pub empty: usize,
    pub skipped: Vec<Skipped>,
    pub cancelled: bool,
}

impl RunReport {
    /// Buckets that reached a terminal outcome
    pub fn completed(&self) -> usize {
        self.written.len() + self.existing + self.empty
    }

    fn record(&mut self, outcome: BucketOutcome) {
        self.skipped.extend(outcome.skipped().iter().cloned());
        match outcome {
            BucketOutcome::Written { path, .. } => self.written.push(path),
            BucketOutcome::Existing(_) => self.existing += 1,
            BucketOutcome::Empty { .. } => self.empty += 1,
        }
    }
}

/// Sends [`WorkerEvent`]s when a listener is attached
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<UnboundedSender<WorkerEvent>>,
}

impl Reporter {
    pub fn new(tx: UnboundedSender<WorkerEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Reporter that only logs
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: WorkerEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening
            let _ = tx.send(event);
        }
    }
}

/// Write acquisition time fields on every trace
pub fn stamp_recording_time(container: &mut SegyContainer, at: NaiveDateTime) -> Result<()> {
    let n = container.ntraces();
    let date = at.date();
    let fields = [
        ("YearDataRecorded", date.year() as i64),
        ("DayOfYear", day_of_year(date) as i64),
        ("HourOfDay", at.hour() as i64),
        ("MinuteOfHour", at.minute() as i64),
        ("SecondOfMinute", at.second() as i64),
    ];
    for (name, value) in fields {
        container.set_trace_column(name, vec![value; n])?;
    }
    Ok(())
}

/// SEG-Y write settings derived from a conversion config
pub(crate) fn write_options(config: &ConvertConfig) -> WriteOptions {
    let options = WriteOptions::default().with_data_sample_format(config.output_format);
    match &config.textual_header {
        Some(text) => options.with_textual_header(text.clone()),
        None => options,
    }
}

enum Step {
    Done(BucketOutcome),
    NotStarted,
}

/// Convert `buckets` in order with bounded parallelism
pub async fn run_buckets<B: Bucket>(
    buckets: Vec<B>,
    config: Arc<ConvertConfig>,
    cancel: &CancelToken,
    reporter: &Reporter,
) -> Result<RunReport> {
    let total = buckets.len();
    let mut report = RunReport {
        total,
        ..RunReport::default()
    };
    reporter.emit(WorkerEvent::Progress { done: 0, total });

    let halt = CancelToken::new();
    let parallelism = config.parallelism.max(1);
    let mut steps = stream::iter(buckets.into_iter().map(|bucket| {
        let config = config.clone();
        let cancel = cancel.clone();
        let halt = halt.clone();
        let reporter = reporter.clone();
        async move {
            if cancel.is_cancelled() || halt.is_cancelled() {
                return Ok::<_, SegyError>(Step::NotStarted);
            }
            reporter.emit(WorkerEvent::Label(bucket.label()));
            let outcome = tokio::task::spawn_blocking(move || bucket.convert(&config)).await??;
            Ok(Step::Done(outcome))
        }
    }))
    .buffered(parallelism);

    let mut failure: Option<SegyError> = None;
    let mut done = 0;
    while let Some(step) = steps.next().await {
        match step {
            Ok(Step::Done(outcome)) => {
                for skipped in outcome.skipped() {
                    reporter.emit(WorkerEvent::Warning(skipped.clone()));
                }
                if let BucketOutcome::Written { path, ntraces, .. } = &outcome {
                    info!(path = %path.display(), ntraces, "Bucket written");
                }
                report.record(outcome);
                done += 1;
                reporter.emit(WorkerEvent::Progress { done, total });
            }
            Ok(Step::NotStarted) => {}
            Err(e) => {
                halt.cancel();
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }
    report.cancelled = cancel.is_cancelled() && report.completed() < total;
    if report.cancelled {
        warn!(done, total, "Conversion cancelled");
    }
    Ok(report)
}

/// Plan and convert every bucket found under `input`
pub async fn run(
    strategy: Strategy,
    input: &Path,
    output: &Path,
    config: ConvertConfig,
    cancel: &CancelToken,
    reporter: &Reporter,
) -> Result<RunReport> {
    config.validate()?;
    tokio::fs::create_dir_all(output)
        .await
        .map_err(|e| SegyError::from(e).at(output))?;
    let config = Arc::new(config);

    let input = input.to_path_buf();
    let out_dir = output.to_path_buf();
    match strategy {
        Strategy::Minute => {
            let planning = config.clone();
            let buckets =
                tokio::task::spawn_blocking(move || minute::plan(&input, &out_dir, &planning)).await??;
            info!(buckets = buckets.len(), "Planned minute buckets");
            run_buckets(buckets, config, cancel, reporter).await
        }
        Strategy::Lapse => {
            let planning = config.clone();
            let (buckets, skipped) = tokio::task::spawn_blocking(move || {
                lapse::plan(&input, &planning)
                    .map(|plan| (plan.into_buckets(&out_dir, &planning), plan.skipped))
            })
            .await??;
            info!(buckets = buckets.len(), "Planned time-lapse windows");
            for file in &skipped {
                reporter.emit(WorkerEvent::Warning(file.clone()));
            }
            let mut report = run_buckets(buckets, config, cancel, reporter).await?;
            let mut all = skipped;
            all.append(&mut report.skipped);
            report.skipped = all;
            Ok(report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorded {
        index: usize,
        log: Arc<Mutex<Vec<usize>>>,
        fail: bool,
        cancel_after: Option<CancelToken>,
    }

    impl Bucket for Recorded {
        fn label(&self) -> String {
            format!("bucket {}", self.index)
        }

        fn convert(self, _config: &ConvertConfig) -> Result<BucketOutcome> {
            self.log.lock().push(self.index);
            if let Some(token) = &self.cancel_after {
                token.cancel();
            }
            if self.fail {
                return Err(SegyError::Configuration("boom".into()));
            }
            Ok(BucketOutcome::Written {
                path: PathBuf::from(format!("{}.sgy", self.index)),
                ntraces: 3,
                skipped: Vec::new(),
            })
        }
    }

    fn buckets(n: usize, log: &Arc<Mutex<Vec<usize>>>) -> Vec<Recorded> {
        (0..n)
            .map(|index| Recorded {
                index,
                log: log.clone(),
                fail: false,
                cancel_after: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let config = Arc::new(ConvertConfig::default().with_parallelism(3));
        let report = run_buckets(buckets(7, &log), config, &CancelToken::new(), &Reporter::new(tx))
            .await
            .unwrap();
        assert_eq!(report.written.len(), 7);
        assert_eq!(report.written[0], PathBuf::from("0.sgy"));
        assert_eq!(report.written[6], PathBuf::from("6.sgy"));

        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkerEvent::Progress { done, .. } = event {
                progress.push(done);
            }
        }
        assert_eq!(progress, (0..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_cancel_stops_at_bucket_boundary() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancelToken::new();
        let mut list = buckets(5, &log);
        list[1].cancel_after = Some(cancel.clone());
        let config = Arc::new(ConvertConfig::default());
        let report = run_buckets(list, config, &cancel, &Reporter::silent()).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.written.len(), 2);
        assert_eq!(*log.lock(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_failure_aborts_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = buckets(4, &log);
        list[1].fail = true;
        let config = Arc::new(ConvertConfig::default());
        let err = run_buckets(list, config, &CancelToken::new(), &Reporter::silent())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(*log.lock(), vec![0, 1]);
    }
}
