//! Scan engine: top-level orchestration tying the planner, executor, record
//! store, status reporter and activity sink together into one scan run.

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::core::config::EngineConfig;
use crate::core::errors::Result;
use crate::job::JobContext;
use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle};
use crate::logger::jsonl::Level;
use crate::scanner::executor::Executor;
use crate::scanner::planner::Planner;
use crate::scanner::types::{PlanAction, ScanResult};
use crate::status::StatusReporter;
use crate::store::RecordStore;

/// Ties the planner and executor to shared state for one engine instance.
/// A single `ScanEngine` is shared across every job the worker runs.
pub struct ScanEngine {
    config: Arc<Mutex<EngineConfig>>,
    store: Arc<dyn RecordStore>,
    status: Arc<StatusReporter>,
    activity: Option<ActivityLoggerHandle>,
}

impl ScanEngine {
    #[must_use]
    pub fn new(
        config: Arc<Mutex<EngineConfig>>,
        store: Arc<dyn RecordStore>,
        status: Arc<StatusReporter>,
        activity: Option<ActivityLoggerHandle>,
    ) -> Self {
        Self {
            config,
            store,
            status,
            activity,
        }
    }

    /// Plan and, unless `dry_run`, execute a full scan. Any execution error
    /// aborts the remaining actions, marks the status `error`, and is
    /// propagated to the caller (normally the job worker, which marks the
    /// job `failed` and keeps running). Already-applied actions are not
    /// rolled back.
    pub fn run_scan(&self, job: JobContext, dry_run: bool) -> Result<ScanResult> {
        let cfg = self.config.lock().clone();
        let now = Utc::now();

        self.status.scan_started(if dry_run {
            "planning"
        } else {
            "scanning"
        });
        self.log(&job, Level::Info, "scan started", None);

        let planner = Planner::new();
        let plan_result = planner.plan(&cfg, self.store.as_ref(), now);
        let result = match plan_result {
            Ok(r) => r,
            Err(err) => {
                self.status.scan_failed(err.to_string());
                self.log(&job, Level::Error, format!("planning failed: {err}"), None);
                return Err(err);
            }
        };

        for warning in &result.warnings {
            self.log(&job, Level::Warn, warning.clone(), None);
        }

        if dry_run {
            self.status.set_meta(
                serde_json::to_value(&result.summary).unwrap_or(serde_json::Value::Null),
            );
            self.status.scan_finished();
            self.log(&job, Level::Info, "plan complete (dry run)", None);
            return Ok(result);
        }

        if let Err(err) = self.execute_all(&job, &cfg, &result.actions) {
            self.status.scan_failed(err.to_string());
            self.log(&job, Level::Error, format!("scan failed: {err}"), None);
            return Err(err);
        }

        self.status.set_meta(
            serde_json::to_value(&result.summary).unwrap_or(serde_json::Value::Null),
        );
        self.status.scan_finished();
        self.log(&job, Level::Info, "scan finished", None);
        Ok(result)
    }

    fn execute_all(
        &self,
        job: &JobContext,
        cfg: &EngineConfig,
        actions: &[PlanAction],
    ) -> Result<()> {
        let executor = Executor::new(cfg);
        let planned = actions.iter().filter(|a| !a.is_skip()).count() as u64;
        let mut completed: u64 = 0;

        for action in actions {
            let now = Utc::now();
            executor.execute(action, self.store.as_ref(), now)?;
            if !action.is_skip() {
                completed += 1;
                self.status.progress(completed, planned);
                self.log_action(job, action);
            }
        }
        Ok(())
    }

    fn log_action(&self, job: &JobContext, action: &PlanAction) {
        let Some(activity) = &self.activity else {
            return;
        };
        let payload = serde_json::to_value(action).ok();
        let mut event = ActivityEvent::log(
            Level::Info,
            format!("{:?} {}", action.decision, action.target_path.display()),
        )
        .with_job_id(job.job_id.to_string());
        if let Some(payload) = payload {
            event = event.with_payload(payload);
        }
        activity.send(event);
    }

    fn log(&self, job: &JobContext, level: Level, message: impl Into<String>, payload: Option<serde_json::Value>) {
        let Some(activity) = &self.activity else {
            return;
        };
        let mut event = ActivityEvent::log(level, message).with_job_id(job.job_id.to_string());
        if let Some(payload) = payload {
            event = event.with_payload(payload);
        }
        activity.send(event);
    }
}
