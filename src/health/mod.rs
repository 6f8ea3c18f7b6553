//! Health Module
//!
//! Read-only view of the root liveness group. The HTTP surface lives in
//! [`api`] and is only compiled with the `health-api` feature.

#[cfg(feature = "health-api")]
mod api;

#[cfg(feature = "health-api")]
pub use api::{create_router, start_server};

use std::sync::Arc;

use crate::heartbeat::{HeartbeatGroup, LivenessSummary};

/// Snapshots the root [`HeartbeatGroup`] for external consumers
#[derive(Debug, Clone)]
pub struct HealthReporter {
    root: Arc<HeartbeatGroup>,
}

impl HealthReporter {
    pub fn new(root: Arc<HeartbeatGroup>) -> Self {
        Self { root }
    }

    /// Full summary, including dead members. Never mutates heartbeat state.
    pub fn snapshot(&self) -> LivenessSummary {
        self.root.summary()
    }

    pub fn is_alive(&self) -> bool {
        self.snapshot().is_alive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::{Heartbeat, Liveness};
    use std::time::Duration;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn snapshot_lists_dead_members_too() {
        let root = Arc::new(HeartbeatGroup::new("feeder"));
        let read = Arc::new(Heartbeat::new(Duration::from_secs(10)));
        let feed = Arc::new(Heartbeat::new(Duration::from_secs(10)));
        root.add_heartbeat("readData", Arc::clone(&read)).unwrap();
        root.add_heartbeat("feedData", Arc::clone(&feed)).unwrap();

        advance(Duration::from_secs(5)).await;
        read.mark_alive();

        let reporter = HealthReporter::new(root);
        let snapshot = reporter.snapshot();

        assert_eq!(snapshot.status, Liveness::Dead);
        assert_eq!(snapshot.members.names().collect::<Vec<_>>(), vec!["readData", "feedData"]);
        assert_eq!(snapshot.members.get("readData").map(|s| s.status), Some(Liveness::Live));
        assert_eq!(snapshot.members.get("feedData").map(|s| s.status), Some(Liveness::Dead));

        // Reading twice changes nothing
        assert_eq!(reporter.snapshot().members.len(), 2);
        assert!(feed.last_alive().is_none());
    }
}
