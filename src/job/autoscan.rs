//! Auto-scan driver: a tick loop that enqueues scan jobs on an interval or
//! on detecting a source mtime change.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::core::config::EngineConfig;
use crate::scanner::walker::WalkerConfig;

const TICK: StdDuration = StdDuration::from_secs(5);
const DISABLED_SLEEP: StdDuration = StdDuration::from_secs(10);
const CHANGE_CHECK_INTERVAL: i64 = 20;

/// Why a trigger fired, formatted into the enqueued job's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReason {
    Interval,
    ChangeSource(String),
}

impl TriggerReason {
    #[must_use]
    pub fn as_job_suffix(&self) -> String {
        match self {
            Self::Interval => "interval".to_string(),
            Self::ChangeSource(id) => format!("change_source_{id}"),
        }
    }
}

/// Tracks timing state across ticks: last full scan, last per-source change
/// check, and the last observed mtime snapshot per source.
pub struct AutoScanDriver {
    config: Arc<Mutex<EngineConfig>>,
    last_full_scan: Mutex<Option<DateTime<Utc>>>,
    last_change_check: Mutex<Option<DateTime<Utc>>>,
    source_mtimes: Mutex<HashMap<String, f64>>,
}

impl AutoScanDriver {
    #[must_use]
    pub fn new(config: Arc<Mutex<EngineConfig>>) -> Self {
        Self {
            config,
            last_full_scan: Mutex::new(None),
            last_change_check: Mutex::new(None),
            source_mtimes: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate trigger conditions once, given the current time. Returns
    /// `Some(reason)` if a scan should be enqueued, and records the new
    /// last-scan time as a side effect of any trigger.
    pub fn evaluate(&self, now: DateTime<Utc>) -> Option<TriggerReason> {
        let cfg = self.config.lock();
        if !cfg.settings.auto_scan_enabled {
            return None;
        }

        let interval = Duration::seconds((cfg.settings.auto_scan_interval_minutes * 60) as i64);
        let mut last_full = self.last_full_scan.lock();
        if last_full.is_none_or(|t| now - t >= interval) {
            *last_full = Some(now);
            return Some(TriggerReason::Interval);
        }
        drop(last_full);

        let mut last_check = self.last_change_check.lock();
        if last_check.is_some_and(|t| now - t < Duration::seconds(CHANGE_CHECK_INTERVAL)) {
            return None;
        }
        *last_check = Some(now);
        drop(last_check);

        let walker_config = WalkerConfig {
            image_extensions: cfg.settings.image_extensions.clone(),
            archive_extensions: cfg.settings.archive_extensions.clone(),
        };

        let mut snapshots = self.source_mtimes.lock();
        let mut sources: Vec<_> = cfg.sources.iter().filter(|s| s.enabled).collect();
        sources.sort_by(|a, b| a.path.cmp(&b.path));

        for source in sources {
            let root = cfg.roots.data_root.join(&source.path);
            let Some(latest) = latest_mtime_under(&root, &walker_config) else {
                continue;
            };
            let changed = snapshots.get(&source.id).is_none_or(|prev| latest > *prev);
            if changed {
                snapshots.insert(source.id.clone(), latest);
                *self.last_full_scan.lock() = Some(now);
                return Some(TriggerReason::ChangeSource(source.id.clone()));
            }
        }

        None
    }
}

/// Latest mtime (seconds since epoch) over any image or archive file under
/// `root`, recursively. Symlinked directories are not followed. `None` if
/// `root` is missing or contains no matching files.
fn latest_mtime_under(root: &Path, config: &WalkerConfig) -> Option<f64> {
    if !root.is_dir() {
        return None;
    }
    let mut latest: Option<f64> = None;
    walk_for_mtime(root, config, &mut latest);
    latest
}

fn walk_for_mtime(dir: &Path, config: &WalkerConfig, latest: &mut Option<f64>) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return;
    };
    for entry in read_dir.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() {
            continue;
        }
        let path = entry.path();
        if file_type.is_dir() {
            walk_for_mtime(&path, config, latest);
        } else if config.is_image(&path) || config.is_archive(&path) {
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    let secs = modified
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_secs_f64())
                        .unwrap_or(0.0);
                    if latest.is_none_or(|l| secs > l) {
                        *latest = Some(secs);
                    }
                }
            }
        }
    }
}

/// Sleep duration to use for the next tick, given whether auto-scan is
/// currently enabled.
#[must_use]
pub const fn next_tick_sleep(auto_scan_enabled: bool) -> StdDuration {
    if auto_scan_enabled { TICK } else { DISABLED_SLEEP }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Settings, Source};
    use std::fs::File;

    fn config_with(auto_scan_enabled: bool, interval_minutes: u64) -> Arc<Mutex<EngineConfig>> {
        let mut settings = Settings::default();
        settings.auto_scan_enabled = auto_scan_enabled;
        settings.auto_scan_interval_minutes = interval_minutes;
        let cfg = EngineConfig {
            settings,
            ..EngineConfig::default()
        };
        Arc::new(Mutex::new(cfg))
    }

    #[test]
    fn disabled_auto_scan_never_triggers() {
        let driver = AutoScanDriver::new(config_with(false, 60));
        assert_eq!(driver.evaluate(Utc::now()), None);
    }

    #[test]
    fn first_evaluation_always_triggers_interval() {
        let driver = AutoScanDriver::new(config_with(true, 60));
        assert_eq!(driver.evaluate(Utc::now()), Some(TriggerReason::Interval));
    }

    #[test]
    fn interval_does_not_retrigger_before_elapsed() {
        let driver = AutoScanDriver::new(config_with(true, 60));
        let now = Utc::now();
        assert_eq!(driver.evaluate(now), Some(TriggerReason::Interval));
        assert_eq!(driver.evaluate(now + Duration::seconds(30)), None);
    }

    #[test]
    fn interval_retriggers_after_elapsed() {
        let driver = AutoScanDriver::new(config_with(true, 1));
        let now = Utc::now();
        assert_eq!(driver.evaluate(now), Some(TriggerReason::Interval));
        let later = now + Duration::seconds(120);
        assert_eq!(driver.evaluate(later), Some(TriggerReason::Interval));
    }

    #[test]
    fn source_mtime_change_triggers_after_change_check_interval() {
        let dir = tempfile::tempdir().unwrap();
        let source_dir = dir.path().join("SeriesA");
        std::fs::create_dir_all(&source_dir).unwrap();
        File::create(source_dir.join("a.jpg")).unwrap();

        let mut settings = Settings::default();
        settings.auto_scan_enabled = true;
        settings.auto_scan_interval_minutes = 10_000;
        let cfg = EngineConfig {
            roots: crate::core::config::RootsConfig {
                data_root: dir.path().to_path_buf(),
                ..crate::core::config::RootsConfig::default()
            },
            settings,
            sources: vec![Source {
                id: "a".to_string(),
                name: "A".to_string(),
                path: "SeriesA".into(),
                enabled: true,
                scan_mode: crate::core::config::ScanMode::Both,
            }],
            exclusions: Vec::new(),
        };
        let driver = AutoScanDriver::new(Arc::new(Mutex::new(cfg)));
        let now = Utc::now();

        assert_eq!(driver.evaluate(now), Some(TriggerReason::Interval));
        let after_20s = now + Duration::seconds(21);
        assert_eq!(
            driver.evaluate(after_20s),
            Some(TriggerReason::ChangeSource("a".to_string()))
        );
        let after_41s = after_20s + Duration::seconds(21);
        assert_eq!(driver.evaluate(after_41s), None);
    }

    #[test]
    fn tick_sleep_is_longer_when_disabled() {
        assert_eq!(next_tick_sleep(true), TICK);
        assert_eq!(next_tick_sleep(false), DISABLED_SLEEP);
    }
}
