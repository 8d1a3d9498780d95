//! Launch history behind the rating prompt heuristic.
//!
//! The only state the store keeps across sessions is how many times the
//! application was launched and when it was first launched.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const SECONDS_PER_DAY: i64 = 86_400;
const HISTORY_FILE: &str = "launches.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRecord {
    pub count: u32,
    /// Unix seconds of the first recorded launch.
    pub first_launch_at: Option<i64>,
}

impl LaunchRecord {
    /// Record one more launch at `now`. The first launch time is kept once set.
    pub fn launched(self, now: i64) -> Self {
        Self {
            count: self.count.saturating_add(1),
            first_launch_at: self.first_launch_at.or(Some(now)),
        }
    }

    /// Whole days between the first launch and `now`; 0 before any launch.
    pub fn days_since_first_launch(&self, now: i64) -> i64 {
        self.first_launch_at
            .map(|first| (now - first) / SECONDS_PER_DAY)
            .unwrap_or(0)
    }
}

/// Where the launch record lives between sessions.
pub trait LaunchHistory: Send + Sync {
    fn load(&self) -> LaunchRecord;

    fn store(&self, record: &LaunchRecord);
}

/// Launch history kept for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryLaunchHistory {
    record: RwLock<LaunchRecord>,
}

impl MemoryLaunchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: LaunchRecord) -> Self {
        Self {
            record: RwLock::new(record),
        }
    }
}

impl LaunchHistory for MemoryLaunchHistory {
    fn load(&self) -> LaunchRecord {
        self.record.read().map(|r| *r).unwrap_or_default()
    }

    fn store(&self, record: &LaunchRecord) {
        if let Ok(mut current) = self.record.write() {
            *current = *record;
        }
    }
}

/// Launch history persisted as `launches.json` in a state directory.
#[derive(Debug)]
pub struct FileLaunchHistory {
    path: PathBuf,
    record: RwLock<LaunchRecord>,
}

impl FileLaunchHistory {
    /// Open the history in `dir`. A missing file starts from an empty record;
    /// an unreadable or malformed one is an error.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(HISTORY_FILE);
        let record = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LaunchRecord::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Loaded launch history from {}: {:?}", path.display(), record);

        Ok(Self {
            path,
            record: RwLock::new(record),
        })
    }
}

impl LaunchHistory for FileLaunchHistory {
    fn load(&self) -> LaunchRecord {
        self.record.read().map(|r| *r).unwrap_or_default()
    }

    fn store(&self, record: &LaunchRecord) {
        if let Ok(mut current) = self.record.write() {
            *current = *record;
        }
        let written = serde_json::to_string(record)
            .map_err(std::io::Error::from)
            .and_then(|json| std::fs::write(&self.path, json));
        if let Err(e) = written {
            tracing::warn!("Failed to persist launch history to {}: {}", self.path.display(), e);
        }
    }
}
