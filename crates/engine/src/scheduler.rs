//! Resume scheduler — wakes suspended runs whose wait has elapsed.
//!
//! Ticks are safe to overlap and to repeat: every resume is claimed with a
//! compare-and-swap on the run status first, so a run picked up by two
//! schedulers (or cancelled in between) is walked at most once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use db::RunStore;

use crate::walker::GraphWalker;
use crate::EngineError;

/// Shortest period the scheduler loop will poll at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ResumeScheduler {
    runs: Arc<dyn RunStore>,
    walker: Arc<GraphWalker>,
}

impl ResumeScheduler {
    pub fn new(runs: Arc<dyn RunStore>, walker: Arc<GraphWalker>) -> Self {
        Self { runs, walker }
    }

    pub async fn tick(&self) -> Result<usize, EngineError> {
        self.tick_at(Utc::now()).await
    }

    /// Resume every run due at `now`, up to the configured batch size.
    /// Returns how many runs this tick actually resumed.
    #[instrument(skip(self))]
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let batch = self.walker.config().resume_batch_size;
        let due = self.runs.due_suspended_runs(now, batch).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(due = due.len(), "suspended runs due");

        let mut resumed = 0;
        for run in due {
            match self.walker.resume(run.id).await {
                Ok(Some(row)) => {
                    resumed += 1;
                    debug!(run_id = %row.id, status = %row.status, "run resumed");
                }
                Ok(None) => {}
                Err(e) => error!(run_id = %run.id, error = %e, "resume failed"),
            }
        }

        info!(resumed, "resume tick finished");
        Ok(resumed)
    }

    /// Tick every `resume_poll_interval` (at least [`MIN_POLL_INTERVAL`])
    /// until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.walker.config().resume_poll_interval.max(MIN_POLL_INTERVAL);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(?period, "resume scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "resume tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("resume scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }
}
