//! Job queue and worker: a single FIFO queue of named jobs, processed one
//! at a time by a dedicated worker thread.

#![allow(missing_docs)]

pub mod autoscan;
pub mod queue;

pub use queue::{Job, JobContext, JobHandle, JobQueue, JobStatus, JobSummary};
