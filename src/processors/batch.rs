// upscaler/src/processors/batch.rs
//! In-memory job queue and the sequential batch runner.
//!
//! The queue owns every [`Job`]. A run snapshots the runnable jobs up front
//! and processes them one at a time; the state lock is released while a job
//! is being enhanced so `clear` and readers are never blocked by a slow
//! remote call. `clear` bumps a generation counter: a run that sees a new
//! generation stops picking up work and discards any result it was waiting
//! for. A run future dropped part way (timeout, `select!`, abort) releases
//! the queue and puts its in-flight job back to `Queued`.

use crate::core::job::{
    EnhancedImage, Job, JobId, JobSnapshot, JobStatus, PreviewRegistry, SourceFile,
};
use crate::core::processor::Enhancer;
use crate::core::{ProcessingConfig, Result, UpscaleError, DEFAULT_SIZE_LIMIT_BYTES};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const EVENT_CAPACITY: usize = 256;
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Queue-level message produced at intake. Never attached to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeNotice {
    Oversized { name: String, limit_mb: u64 },
    UnsupportedType { name: String, mime_type: String },
}

impl fmt::Display for IntakeNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntakeNotice::Oversized { name, limit_mb } => write!(
                f,
                "{}: File is too large. Please upload an image under {}MB.",
                name, limit_mb
            ),
            IntakeNotice::UnsupportedType { name, mime_type } => write!(
                f,
                "{}: Unsupported file type {} (PNG, JPG or WEBP only).",
                name, mime_type
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeReport {
    pub added: Vec<JobId>,
    pub notices: Vec<IntakeNotice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    BatchStarted { jobs: usize },
    Status { id: JobId, status: JobStatus },
    BatchFinished(BatchSummary),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    /// Jobs whose result arrived after the queue was cleared.
    pub discarded: usize,
    pub abandoned: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: Vec<Job>,
    running: bool,
    generation: u64,
}

impl QueueState {
    fn job_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.id() == id)
    }

    /// Ends the run of `generation`. True when `current` went back to the queue.
    fn release_run(&mut self, generation: u64, current: Option<JobId>) -> bool {
        if self.generation != generation {
            return false;
        }
        self.running = false;
        current
            .and_then(|id| self.job_mut(id))
            .is_some_and(Job::interrupt)
    }
}

/// Held by an active run; releases it if the run future is dropped early.
struct RunGuard {
    state: Arc<Mutex<QueueState>>,
    events: broadcast::Sender<JobEvent>,
    generation: u64,
    current: Option<JobId>,
    armed: bool,
}

impl RunGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let generation = self.generation;
        let current = self.current.take();
        log::warn!("Batch run stopped early; releasing the queue");

        let notify = move |events: &broadcast::Sender<JobEvent>, requeued: bool| {
            if let (true, Some(id)) = (requeued, current) {
                let _ = events.send(JobEvent::Status {
                    id,
                    status: JobStatus::Queued,
                });
            }
        };

        if let Ok(mut state) = self.state.try_lock() {
            let requeued = state.release_run(generation, current);
            drop(state);
            notify(&self.events, requeued);
            return;
        }

        // Someone holds the lock right now; finish the release once they are done.
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let requeued = state.lock().await.release_run(generation, current);
                    notify(&events, requeued);
                });
            }
            Err(_) => log::error!("No runtime to release the queue from run {}", generation),
        }
    }
}

#[derive(Clone)]
pub struct JobQueue {
    state: Arc<Mutex<QueueState>>,
    previews: PreviewRegistry,
    events: broadcast::Sender<JobEvent>,
    size_limit: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            previews: PreviewRegistry::new(),
            events,
            size_limit: DEFAULT_SIZE_LIMIT_BYTES,
        }
    }

    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = bytes;
        self
    }

    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Appends a queued job per acceptable file, in input order.
    pub async fn enqueue(&self, files: Vec<SourceFile>) -> IntakeReport {
        self.enqueue_with_limit(files, self.size_limit).await
    }

    /// Like [`JobQueue::enqueue`] with a per-call size ceiling in bytes.
    pub async fn enqueue_with_limit(&self, files: Vec<SourceFile>, size_limit: u64) -> IntakeReport {
        let mut report = IntakeReport::default();
        let mut state = self.state.lock().await;

        for file in files {
            if file.size > size_limit {
                log::warn!(
                    "Rejecting {}: {} bytes exceeds limit of {} bytes",
                    file.name,
                    file.size,
                    size_limit
                );
                report.notices.push(IntakeNotice::Oversized {
                    name: file.name,
                    limit_mb: size_limit / BYTES_PER_MB,
                });
                continue;
            }

            if file.image_mime().is_none() {
                log::warn!("Rejecting {}: unsupported type {}", file.name, file.mime_type);
                report.notices.push(IntakeNotice::UnsupportedType {
                    name: file.name,
                    mime_type: file.mime_type,
                });
                continue;
            }

            let job = Job::new(file, &self.previews);
            log::debug!("Queued job {} for {}", job.id(), job.source().name);
            report.added.push(job.id());
            state.jobs.push(job);
        }

        report
    }

    /// Drops every job and abandons any active run.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        let dropped = state.jobs.len();
        state.jobs.clear();
        state.running = false;
        state.generation += 1;
        log::info!("Cleared queue ({} jobs)", dropped);
    }

    pub async fn jobs(&self) -> Vec<JobSnapshot> {
        let state = self.state.lock().await;
        state.jobs.iter().map(Job::snapshot).collect()
    }

    pub async fn get(&self, id: JobId) -> Option<JobSnapshot> {
        let state = self.state.lock().await;
        state.jobs.iter().find(|job| job.id() == id).map(Job::snapshot)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// Processes every queued or errored job, strictly one at a time.
    ///
    /// Per-job failures are recorded on the job; only a concurrent run is an
    /// error here.
    pub async fn run_batch(
        &self,
        config: ProcessingConfig,
        enhancer: &Enhancer,
    ) -> Result<BatchSummary> {
        let (generation, pending) = {
            let mut state = self.state.lock().await;
            if state.running {
                return Err(UpscaleError::BatchInProgress);
            }
            let pending: Vec<(JobId, SourceFile)> = state
                .jobs
                .iter()
                .filter(|job| job.status().is_runnable())
                .map(|job| (job.id(), job.source().clone()))
                .collect();
            if !pending.is_empty() {
                state.running = true;
            }
            (state.generation, pending)
        };

        let mut summary = BatchSummary::default();
        if pending.is_empty() {
            log::debug!("Nothing to process");
            return Ok(summary);
        }
        let mut guard = RunGuard {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            generation,
            current: None,
            armed: true,
        };

        log::info!(
            "Processing {} images ({:?} engine, {}x)",
            pending.len(),
            config.engine,
            config.factor
        );
        self.publish(JobEvent::BatchStarted { jobs: pending.len() });

        for (id, source) in pending {
            if !self.start_job(generation, id).await {
                if self.is_abandoned(generation).await {
                    summary.abandoned = true;
                    break;
                }
                continue;
            }
            guard.current = Some(id);

            let outcome = enhancer.enhance(&source, &config).await;
            match &outcome {
                Ok(image) => log::info!(
                    "Job {} ({}) completed: {}x{}, {} bytes",
                    id,
                    source.name,
                    image.width,
                    image.height,
                    image.byte_size()
                ),
                Err(e) => log::error!("Job {} ({}) failed: {}", id, source.name, e),
            }
            let succeeded = outcome.is_ok();

            let finished = self.finish_job(generation, id, outcome).await;
            guard.current = None;
            match finished {
                Some(status) => {
                    if succeeded {
                        summary.completed += 1;
                    } else {
                        summary.failed += 1;
                    }
                    self.publish(JobEvent::Status { id, status });
                }
                None => {
                    log::warn!("Discarding result for job {}: queue was cleared", id);
                    summary.discarded += 1;
                    if self.is_abandoned(generation).await {
                        summary.abandoned = true;
                        break;
                    }
                }
            }
        }

        self.state.lock().await.release_run(generation, None);
        guard.disarm();

        log::info!(
            "Batch finished: {} completed, {} failed, {} discarded",
            summary.completed,
            summary.failed,
            summary.discarded
        );
        self.publish(JobEvent::BatchFinished(summary));
        Ok(summary)
    }

    /// Moves a job into `Processing`. False if the run was abandoned or the
    /// job is gone.
    async fn start_job(&self, generation: u64, id: JobId) -> bool {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return false;
        }
        let Some(job) = state.job_mut(id) else {
            return false;
        };
        if let Err(e) = job.start() {
            log::warn!("Skipping job {}: {}", id, e);
            return false;
        }
        drop(state);
        self.publish(JobEvent::Status {
            id,
            status: JobStatus::Processing,
        });
        true
    }

    /// Records the outcome unless the job was cleared in the meantime.
    async fn finish_job(
        &self,
        generation: u64,
        id: JobId,
        outcome: Result<EnhancedImage>,
    ) -> Option<JobStatus> {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return None;
        }
        let job = state.job_mut(id)?;
        job.finish(outcome).ok()?;
        Some(job.status())
    }

    async fn is_abandoned(&self, generation: u64) -> bool {
        self.state.lock().await.generation != generation
    }

    fn publish(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
