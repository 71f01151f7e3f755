//! Periodic overdue sweep

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::{error::AppResult, repository::Repository};

pub struct OverdueSweeper {
    repository: Repository,
    interval: Duration,
}

impl OverdueSweeper {
    pub fn new(repository: Repository, interval: Duration) -> Self {
        Self { repository, interval }
    }

    /// Flag open borrows past their due date as of `now`
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let flagged = self.repository.borrows.mark_overdue(now).await?;
        if flagged > 0 {
            tracing::info!(flagged, "Flagged overdue borrows");
        }
        Ok(flagged)
    }

    /// Sweep on every tick until `shutdown` turns true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Overdue sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        tracing::warn!("Overdue sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Overdue sweeper stopped");
    }
}
