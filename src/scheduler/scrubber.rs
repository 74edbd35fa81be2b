use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::scheduler::trackers::TrackerRegistry;

/// Source of "now" for each scrub pass.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Periodic liveness sweep over the tracker registry.
pub struct Scrubber {
    trackers: Arc<TrackerRegistry>,
    interval: Duration,
    clock: Clock,
}

impl Scrubber {
    pub fn new(trackers: Arc<TrackerRegistry>, interval_ms: u64) -> Self {
        Self {
            trackers,
            interval: Duration::from_millis(interval_ms.max(1)),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used to judge tracker silence.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Scrub once per tick until `shutdown` is cancelled. Ticks never overlap:
    /// a slow pass pushes the next one back instead of bunching them up.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so a fresh
        // orchestrator does not scrub before anyone could check in.
        interval.tick().await;

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Scrub loop started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Scrub loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.trackers.scrub_at((self.clock)()).await;
                }
            }
        }
    }
}
