//! FIFO job queue with a single worker thread.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

use crate::core::errors::{GlError, Result};
use crate::logger::dual::ActivityLoggerHandle;

/// Lifecycle of a single enqueued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time status snapshot for one job, as exposed to callers.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub id: u64,
    pub name: String,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Explicit per-job context, passed by value into the job body. Carries the
/// job id so activity entries emitted during execution can be tagged
/// without relying on thread-local or other ambient state.
#[derive(Debug, Clone, Copy)]
pub struct JobContext {
    pub job_id: u64,
}

type JobFn = Box<dyn FnOnce(JobContext) -> Result<()> + Send>;

/// A unit of work accepted by the queue.
pub struct Job {
    pub id: u64,
    pub name: String,
    task: JobFn,
}

impl Job {
    #[must_use]
    pub fn new(
        id: u64,
        name: impl Into<String>,
        task: impl FnOnce(JobContext) -> Result<()> + Send + 'static,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            task: Box::new(task),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`JobQueue::enqueue`] to observe a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: u64,
}

struct Shared {
    summaries: Mutex<HashMap<u64, JobSummary>>,
}

/// FIFO queue of jobs, drained by exactly one worker thread.
///
/// A failed job is recorded and does not halt the worker; the next queued
/// job runs regardless.
pub struct JobQueue {
    tx: Sender<Job>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    _worker: JoinHandle<()>,
}

impl JobQueue {
    /// Spawn the worker thread and return a queue ready to accept jobs.
    /// `activity` is optional: when present, job lifecycle transitions are
    /// reported to the activity sink.
    #[must_use]
    pub fn spawn(capacity: usize, activity: Option<ActivityLoggerHandle>) -> Self {
        let (tx, rx): (Sender<Job>, Receiver<Job>) = bounded(capacity.max(1));
        let shared = Arc::new(Shared {
            summaries: Mutex::new(HashMap::new()),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("gallery-sync-worker".to_string())
            .spawn(move || worker_main(rx, worker_shared, activity))
            .expect("failed to spawn job worker thread");

        Self {
            tx,
            shared,
            next_id: AtomicU64::new(1),
            _worker: worker,
        }
    }

    /// Enqueue a job body, returning a handle to its assigned id.
    ///
    /// # Errors
    /// Returns an error if the queue is full or the worker has stopped.
    pub fn enqueue(
        &self,
        name: impl Into<String>,
        task: impl FnOnce(JobContext) -> Result<()> + Send + 'static,
    ) -> Result<JobHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let name = name.into();
        self.shared.summaries.lock().insert(
            id,
            JobSummary {
                id,
                name: name.clone(),
                status: JobStatus::Queued,
                enqueued_at: Utc::now(),
                started_at: None,
                finished_at: None,
                error: None,
            },
        );

        let job = Job::new(id, name, task);
        self.tx.try_send(job).map_err(|_| GlError::Runtime {
            details: "job queue is full or worker has stopped".to_string(),
        })?;

        Ok(JobHandle { id })
    }

    /// Current status of a job, if it has ever been enqueued.
    #[must_use]
    pub fn status(&self, id: u64) -> Option<JobSummary> {
        self.shared.summaries.lock().get(&id).cloned()
    }

    /// True if any job is currently `Running`.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.shared
            .summaries
            .lock()
            .values()
            .any(|s| s.status == JobStatus::Running)
    }

    /// All job summaries, most recently enqueued first.
    #[must_use]
    pub fn all_summaries(&self) -> Vec<JobSummary> {
        let mut all: Vec<_> = self.shared.summaries.lock().values().cloned().collect();
        all.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));
        all
    }
}

fn worker_main(rx: Receiver<Job>, shared: Arc<Shared>, activity: Option<ActivityLoggerHandle>) {
    for job in rx {
        let ctx = JobContext { job_id: job.id };

        if let Some(summary) = shared.summaries.lock().get_mut(&job.id) {
            summary.status = JobStatus::Running;
            summary.started_at = Some(Utc::now());
        }
        if let Some(handle) = &activity {
            handle.send(
                crate::logger::dual::ActivityEvent::log(
                    crate::logger::jsonl::Level::Info,
                    format!("job {} started", job.name),
                )
                .with_job_id(job.id.to_string()),
            );
        }

        let name = job.name.clone();
        let result = (job.task)(ctx);

        let mut summaries = shared.summaries.lock();
        if let Some(summary) = summaries.get_mut(&ctx.job_id) {
            summary.finished_at = Some(Utc::now());
            match &result {
                Ok(()) => summary.status = JobStatus::Done,
                Err(e) => {
                    summary.status = JobStatus::Failed;
                    summary.error = Some(e.to_string());
                }
            }
        }
        drop(summaries);

        if let Some(handle) = &activity {
            let level = if result.is_ok() {
                crate::logger::jsonl::Level::Info
            } else {
                crate::logger::jsonl::Level::Error
            };
            let message = match &result {
                Ok(()) => format!("job {name} finished"),
                Err(e) => format!("job {name} failed: {e}"),
            };
            handle.send(
                crate::logger::dual::ActivityEvent::log(level, message)
                    .with_job_id(ctx.job_id.to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn enqueue_and_wait_for_completion() {
        let queue = JobQueue::spawn(8, None);
        let handle = queue
            .enqueue("scan_auto_interval", |_ctx| Ok(()))
            .unwrap();

        let mut status = queue.status(handle.id);
        for _ in 0..200 {
            if matches!(status.as_ref().map(|s| s.status), Some(JobStatus::Done)) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
            status = queue.status(handle.id);
        }
        assert_eq!(status.unwrap().status, JobStatus::Done);
    }

    #[test]
    fn failed_job_does_not_halt_the_worker() {
        let queue = JobQueue::spawn(8, None);
        let first = queue
            .enqueue("broken", |_ctx| {
                Err(GlError::Runtime {
                    details: "boom".into(),
                })
            })
            .unwrap();
        let second = queue.enqueue("healthy", |_ctx| Ok(())).unwrap();

        let mut second_status = queue.status(second.id);
        for _ in 0..200 {
            if matches!(
                second_status.as_ref().map(|s| s.status),
                Some(JobStatus::Done)
            ) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
            second_status = queue.status(second.id);
        }

        assert_eq!(queue.status(first.id).unwrap().status, JobStatus::Failed);
        assert_eq!(second_status.unwrap().status, JobStatus::Done);
    }

    #[test]
    fn job_context_carries_its_own_id() {
        let queue = JobQueue::spawn(8, None);
        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = Arc::clone(&seen);
        let handle = queue
            .enqueue("check_ctx", move |ctx| {
                seen_clone.store(ctx.job_id > 0, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        for _ in 0..200 {
            if matches!(
                queue.status(handle.id).map(|s| s.status),
                Some(JobStatus::Done)
            ) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(seen.load(Ordering::SeqCst));
    }
}
