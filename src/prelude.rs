//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use gallery_sync::prelude::*;
//! ```

// Core
pub use crate::core::config::{EngineConfig, OutputMode, ScanMode, Settings, Source};
pub use crate::core::errors::{GlError, Result};

// Scanner
pub use crate::scanner::classifier::Classification;
pub use crate::scanner::diff::{DiffEngine, DiffReport};
pub use crate::scanner::engine::ScanEngine;
pub use crate::scanner::executor::Executor;
pub use crate::scanner::planner::Planner;
pub use crate::scanner::types::{Decision, PlanAction, ReasonCode, ScanResult, ScanSummary, Signature};
pub use crate::scanner::walker::{DirectoryWalker, WalkerConfig};

// Record store
pub use crate::store::{ArchiveRecord, RecordStore, RecordType};

// Job queue and auto-scan driver
pub use crate::job::autoscan::{AutoScanDriver, TriggerReason};
pub use crate::job::{JobContext, JobQueue, JobStatus, JobSummary};

// Status
pub use crate::status::{EngineState, StatusReporter, StatusSnapshot};

// Activity sink
pub use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle};
