//! Fallback watchdog.
//!
//! A session-scoped poller that compensates for a missed scheduled
//! run: it re-reads the health snapshot on a fixed interval and, on
//! the first overdue observation, triggers exactly one sync run tagged
//! `fallback`, then disables itself for the rest of the process
//! lifetime. It is not a scheduler replacement.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::application::health::HealthSnapshotBuilder;
use crate::application::sync_orchestrator::SyncOrchestrator;
use crate::domain::entities::SyncTrigger;

/// One-shot trigger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Armed,
    Fired,
}

/// The one-shot state machine, separate from the poll loop so the
/// transition can be tested directly.
#[derive(Debug)]
pub struct OneShotTrigger {
    state: WatchdogState,
}

impl OneShotTrigger {
    pub fn new() -> Self {
        Self {
            state: WatchdogState::Armed,
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Returns true exactly once, on the first overdue observation
    /// while armed.
    pub fn observe(&mut self, overdue: bool) -> bool {
        if overdue && self.state == WatchdogState::Armed {
            self.state = WatchdogState::Fired;
            true
        } else {
            false
        }
    }
}

impl Default for OneShotTrigger {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FallbackWatchdog {
    trigger: OneShotTrigger,
    poll_interval: Duration,
    health: Arc<HealthSnapshotBuilder>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl FallbackWatchdog {
    pub fn new(
        health: Arc<HealthSnapshotBuilder>,
        orchestrator: Arc<SyncOrchestrator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            trigger: OneShotTrigger::new(),
            poll_interval,
            health,
            orchestrator,
        }
    }

    /// Poll loop. Runs until the one-shot fires, then exits; snapshot
    /// read failures are logged and polling continues.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "fallback watchdog armed"
        );

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let overdue = match self.health.build().await {
                Ok(report) => report.health.sync_overdue,
                Err(err) => {
                    warn!(error = %err, "watchdog health check failed");
                    continue;
                }
            };

            if self.trigger.observe(overdue) {
                info!("sync overdue detected, triggering fallback sync");
                match self.orchestrator.run_sync(SyncTrigger::Fallback).await {
                    Ok(outcome) => info!(
                        status = outcome.status.as_str(),
                        synced = outcome.success_count,
                        failed = outcome.failure_count,
                        "fallback sync completed"
                    ),
                    Err(err) => warn!(error = %err, "fallback sync failed"),
                }
                // One-shot: disabled for the remainder of the session.
                return;
            }
        }
    }
}
