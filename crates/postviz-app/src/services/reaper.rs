//! Recovery for records stranded in `generating`.
//!
//! A run killed mid-flight never reaches its terminal commit. Re-running the
//! item recovers it implicitly; this module gives operators an explicit sweep
//! that fails stranded records after an age threshold.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::services::records::{GenerationRecordStore, RecordStatus, RecordStoreError};

const COMMIT_ATTEMPTS: u32 = 3;

/// Configuration for the stuck-record reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Maximum age for records in `generating` status (milliseconds).
    pub generating_max_age_ms: i64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            generating_max_age_ms: 7_200_000, // 2 hours
        }
    }
}

/// Report of reaper execution results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperReport {
    /// Item ids that were marked failed.
    pub failed: Vec<String>,
}

impl ReaperReport {
    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ReaperError {
    #[error(transparent)]
    Store(#[from] RecordStoreError),
    #[error("reaper configuration invalid: {0}")]
    InvalidConfig(String),
}

/// Fail every record stuck in `generating` past the configured age.
pub fn reap_stuck_records(
    store: &GenerationRecordStore,
    config: &ReaperConfig,
) -> Result<ReaperReport, ReaperError> {
    if config.generating_max_age_ms <= 0 {
        return Err(ReaperError::InvalidConfig(
            "age threshold must be positive".to_string(),
        ));
    }

    let stuck = store.list_stuck(RecordStatus::Generating, config.generating_max_age_ms)?;
    let mut report = ReaperReport { failed: Vec::new() };

    for record in stuck {
        let age_ms = config.generating_max_age_ms;
        store.modify(&record.item_id, COMMIT_ATTEMPTS, |rec| {
            rec.set_status(
                RecordStatus::Failed,
                Some(format!("generation did not finish within {age_ms}ms")),
            );
        })?;
        info!(item_id = %record.item_id, slug = %record.slug, "reaped stuck record");
        report.failed.push(record.item_id);
    }

    Ok(report)
}
