//! Background conversion with progress events and cancellation

use super::{run, CancelToken, Reporter, RunReport, Skipped, Strategy};
use crate::config::ConvertConfig;
use crate::error::{Result, SegyError};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Lifecycle of a [`ConversionWorker`]
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStatus {
    Running,
    Completed(RunReport),
    /// Stopped at a bucket boundary; the report covers what was finished
    Cancelled(RunReport),
    Failed {
        message: String,
        path: Option<PathBuf>,
    },
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerStatus::Running)
    }
}

/// Notifications sent while a conversion runs
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Started { strategy: Strategy, input: PathBuf },
    Progress { done: usize, total: usize },
    /// Bucket about to be converted
    Label(String),
    Warning(Skipped),
    Finished(WorkerStatus),
}

/// A conversion running on the tokio runtime
pub struct ConversionWorker {
    cancel: CancelToken,
    status: Arc<RwLock<WorkerStatus>>,
    handle: Arc<Mutex<Option<JoinHandle<Result<RunReport>>>>>,
}

impl ConversionWorker {
    /// Start converting `input` into `output`; must be called within a tokio runtime
    pub fn spawn(
        strategy: Strategy,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        config: ConvertConfig,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let input = input.into();
        let output = output.into();
        let cancel = CancelToken::new();
        let status = Arc::new(RwLock::new(WorkerStatus::Running));

        let reporter = Reporter::new(tx);
        let task_cancel = cancel.clone();
        let task_status = status.clone();
        let handle = tokio::spawn(async move {
            reporter.emit(WorkerEvent::Started {
                strategy,
                input: input.clone(),
            });
            info!(?strategy, input = %input.display(), output = %output.display(), "Conversion started");

            let result = run(strategy, &input, &output, config, &task_cancel, &reporter).await;
            let terminal = match &result {
                Ok(report) if report.cancelled => WorkerStatus::Cancelled(report.clone()),
                Ok(report) => WorkerStatus::Completed(report.clone()),
                Err(e) => {
                    error!(error = %e, "Conversion failed");
                    WorkerStatus::Failed {
                        message: e.to_string(),
                        path: e.path().cloned(),
                    }
                }
            };
            *task_status.write() = terminal.clone();
            reporter.emit(WorkerEvent::Finished(terminal));
            result
        });

        let worker = Self {
            cancel,
            status,
            handle: Arc::new(Mutex::new(Some(handle))),
        };
        (worker, rx)
    }

    /// Ask the run to stop before its next bucket
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.read().clone()
    }

    /// Wait for the run to finish
    pub async fn join(&self) -> Result<RunReport> {
        let handle = self
            .handle
            .lock()
            .take()
            .ok_or_else(|| SegyError::Worker("worker already joined".to_string()))?;
        handle.await?
    }
}
