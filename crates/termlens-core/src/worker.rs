//! Background worker for large rectangular extractions.
//!
//! Rectangles above the row threshold are too slow for the interactive path.
//! They run on a blocking thread owned by one long-lived worker task with a
//! single-slot queue: submitting a new job replaces the waiting one and
//! cancels the running one. Progress and results arrive as
//! [`ExtractionEvent`]s on an unbounded channel.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::extract::{ExtractOutcome, RegionExtractor};
use crate::grid::GridRect;
use crate::source::TextSource;

/// Identifies a submitted job in events.
pub type JobId = u64;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

/// Messages from the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExtractionEvent {
    Progress {
        job: JobId,
        done: usize,
        total: usize,
    },
    Finished {
        job: JobId,
        rows: Vec<String>,
    },
    Cancelled {
        job: JobId,
        rows_done: usize,
        rows_total: usize,
    },
    Failed {
        job: JobId,
        error: ApiError,
    },
}

impl ExtractionEvent {
    pub fn job(&self) -> JobId {
        match self {
            ExtractionEvent::Progress { job, .. }
            | ExtractionEvent::Finished { job, .. }
            | ExtractionEvent::Cancelled { job, .. }
            | ExtractionEvent::Failed { job, .. } => *job,
        }
    }

    /// Whether this is the last event for its job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExtractionEvent::Progress { .. })
    }
}

/// How a rectangle request was served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Small enough to extract inline.
    Immediate(Vec<String>),
    /// Handed to the worker; watch the event channel for this id.
    Deferred(JobId),
}

#[derive(Debug)]
struct Job {
    id: JobId,
    rect: GridRect,
    cancelled: AtomicBool,
    state: AtomicU8,
}

impl Job {
    fn rows_total(&self) -> usize {
        usize::try_from(self.rect.row_count()).unwrap_or(usize::MAX)
    }
}

/// Single-slot extraction worker.
pub struct ExtractionWorker<S: TextSource + 'static> {
    extractor: Arc<RegionExtractor<S>>,
    slot: watch::Sender<Option<Arc<Job>>>,
    events: mpsc::UnboundedSender<ExtractionEvent>,
    next_id: AtomicU64,
    task: JoinHandle<()>,
}

impl<S: TextSource + 'static> ExtractionWorker<S> {
    /// Start the worker task. Must be called inside a tokio runtime.
    pub fn spawn(
        extractor: Arc<RegionExtractor<S>>,
    ) -> (Self, mpsc::UnboundedReceiver<ExtractionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (slot, slot_rx) = watch::channel(None);
        let task = tokio::spawn(run_worker(
            Arc::clone(&extractor),
            slot_rx,
            events.clone(),
        ));

        let worker = Self {
            extractor,
            slot,
            events,
            next_id: AtomicU64::new(0),
            task,
        };
        (worker, events_rx)
    }

    pub fn extractor(&self) -> &Arc<RegionExtractor<S>> {
        &self.extractor
    }

    /// Extract between two corners, inline when small and on the worker
    /// when the row count exceeds the background threshold.
    pub fn extract_rectangle(
        &self,
        corner_a: &S::Token,
        corner_b: &S::Token,
    ) -> Result<Extraction, ApiError> {
        let rect = self.extractor.resolve_rect(corner_a, corner_b)?;
        self.route(rect)
    }

    /// Same as [`extract_rectangle`](Self::extract_rectangle) for a rectangle
    /// already in grid coordinates.
    pub fn extract_rect(&self, rect: GridRect) -> Result<Extraction, ApiError> {
        self.extractor.check_limits(&rect)?;
        self.route(rect)
    }

    /// Queue a rectangle, replacing any job already queued or running.
    pub fn submit(&self, rect: GridRect) -> JobId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let job = Arc::new(Job {
            id,
            rect,
            cancelled: AtomicBool::new(false),
            state: AtomicU8::new(PENDING),
        });

        debug!("Submitting extraction job {} ({} rows)", id, rect.row_count());
        if let Some(previous) = self.slot.send_replace(Some(job)) {
            self.cancel_job(&previous);
        }
        id
    }

    /// Cancel the current job. Returns false if there was nothing to cancel.
    pub fn cancel(&self) -> bool {
        let current = self.slot.borrow().clone();
        match current {
            Some(job) if job.state.load(Ordering::Acquire) != DONE => {
                self.cancel_job(&job);
                true
            }
            _ => false,
        }
    }

    fn route(&self, rect: GridRect) -> Result<Extraction, ApiError> {
        let threshold = u64::from(self.extractor.settings().background_row_threshold);
        if rect.row_count() > threshold {
            Ok(Extraction::Deferred(self.submit(rect)))
        } else {
            Ok(Extraction::Immediate(self.extractor.extract_rect(&rect)?))
        }
    }

    /// Cancel outstanding work and wait for the worker task to exit.
    pub async fn shutdown(self) {
        self.cancel();
        let Self { slot, task, .. } = self;
        drop(slot);
        if let Err(e) = task.await {
            warn!("Extraction worker task failed: {}", e);
        }
    }

    fn cancel_job(&self, job: &Job) {
        job.cancelled.store(true, Ordering::Release);
        // A job that never started reports its own cancellation here; a
        // running one notices the flag at its next row.
        if job
            .state
            .compare_exchange(PENDING, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("Extraction job {} cancelled before start", job.id);
            let _ = self.events.send(ExtractionEvent::Cancelled {
                job: job.id,
                rows_done: 0,
                rows_total: job.rows_total(),
            });
        }
    }
}

async fn run_worker<S: TextSource + 'static>(
    extractor: Arc<RegionExtractor<S>>,
    mut slot: watch::Receiver<Option<Arc<Job>>>,
    events: mpsc::UnboundedSender<ExtractionEvent>,
) {
    while slot.changed().await.is_ok() {
        let Some(job) = slot.borrow_and_update().clone() else {
            continue;
        };
        if job
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            continue;
        }

        let extractor = Arc::clone(&extractor);
        let job_events = events.clone();
        let running = Arc::clone(&job);
        let result =
            tokio::task::spawn_blocking(move || run_job(&extractor, &running, &job_events)).await;

        if let Err(e) = result {
            job.state.store(DONE, Ordering::Release);
            let _ = events.send(ExtractionEvent::Failed {
                job: job.id,
                error: ApiError::internal(format!("Extraction task failed: {}", e)),
            });
        }
    }
    debug!("Extraction worker stopped");
}

fn run_job<S: TextSource>(
    extractor: &RegionExtractor<S>,
    job: &Job,
    events: &mpsc::UnboundedSender<ExtractionEvent>,
) {
    let outcome = extractor.extract_rect_with(
        &job.rect,
        &|| job.cancelled.load(Ordering::Acquire),
        &mut |done, total| {
            let _ = events.send(ExtractionEvent::Progress {
                job: job.id,
                done,
                total,
            });
        },
    );
    job.state.store(DONE, Ordering::Release);

    let event = match outcome {
        Ok(ExtractOutcome::Complete(rows)) => ExtractionEvent::Finished { job: job.id, rows },
        Ok(ExtractOutcome::Cancelled {
            partial,
            rows_total,
        }) => ExtractionEvent::Cancelled {
            job: job.id,
            rows_done: partial.len(),
            rows_total,
        },
        Err(error) => ExtractionEvent::Failed { job: job.id, error },
    };
    let _ = events.send(event);
}
