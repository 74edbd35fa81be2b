use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::scheduler::TrackerRecord;
use crate::worker::client::OrchestratorClient;

/// Heartbeat sender that periodically checks the tracker in with the
/// orchestrator. Failures are logged and retried on the next tick.
pub struct HeartbeatSender {
    interval: Duration,
}

impl HeartbeatSender {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run until `shutdown` fires, sending the current tracker record each tick.
    pub async fn run(
        &self,
        tracker: Arc<RwLock<TrackerRecord>>,
        client: Arc<dyn OrchestratorClient>,
        shutdown: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let snapshot = tracker.read().await.clone();
                    match client.check_in(&snapshot).await {
                        Ok(true) => {
                            tracing::trace!(tracker_id = %snapshot.id, status = %snapshot.status, "Heartbeat sent");
                        }
                        Ok(false) => {
                            tracing::warn!(tracker_id = %snapshot.id, "Heartbeat rejected by orchestrator");
                        }
                        Err(e) => {
                            tracing::warn!(tracker_id = %snapshot.id, error = %e, "Heartbeat failed");
                        }
                    }
                }
            }
        }

        tracing::debug!("Heartbeat sender stopped");
    }
}
