//! Data-gap detection.
//!
//! Invoked once after every sync run. The actual gap computation (a
//! set-difference over expected daily points) is delegated to the
//! store; this component upserts the results, never overwriting an
//! existing backfilled flag. Failures here are logged by the caller
//! and never fail the enclosing run.

use std::sync::Arc;

use anyhow::Result;

use crate::infrastructure::extension_repository::ExtensionRepository;

pub struct GapDetector {
    repo: Arc<ExtensionRepository>,
    /// Same fixed day-boundary offset the idempotency gate uses, so
    /// both subsystems agree on where a calendar day ends.
    offset_minutes: i32,
}

impl GapDetector {
    pub fn new(repo: Arc<ExtensionRepository>, offset_minutes: i32) -> Self {
        Self {
            repo,
            offset_minutes,
        }
    }

    /// Detect and record gaps. Returns how many missing days were
    /// found (including previously recorded ones, which are refreshed).
    pub async fn detect_and_record(&self) -> Result<usize> {
        let gaps = self.repo.find_missing_days(self.offset_minutes).await?;
        if gaps.is_empty() {
            return Ok(0);
        }
        self.repo.upsert_gaps(&gaps).await?;
        Ok(gaps.len())
    }
}
