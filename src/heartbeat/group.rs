//! Named, ordered aggregation of heartbeats

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::{Heartbeat, Liveness, LivenessSummary, Members};
use crate::error::LivenessError;

type Probe = Arc<dyn Fn() -> LivenessSummary + Send + Sync>;

/// One entry of a [`HeartbeatGroup`]
#[derive(Clone)]
pub enum Member {
    Heartbeat(Arc<Heartbeat>),
    Group(Arc<HeartbeatGroup>),
    /// Any callable producing its own summary
    Probe(Probe),
}

impl Member {
    fn summary(&self) -> LivenessSummary {
        match self {
            Member::Heartbeat(hb) => hb.summary(),
            Member::Group(group) => group.summary(),
            Member::Probe(probe) => match catch_unwind(AssertUnwindSafe(|| probe())) {
                Ok(summary) => summary,
                Err(_) => LivenessSummary::failed("probe panicked"),
            },
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Heartbeat(hb) => f.debug_tuple("Heartbeat").field(hb).finish(),
            Member::Group(group) => f.debug_tuple("Group").field(&group.name).finish(),
            Member::Probe(_) => f.write_str("Probe"),
        }
    }
}

/// Named collection of heartbeats, nested groups and probes.
///
/// The group status is the worst of its members, unless the group was created
/// with [`HeartbeatGroup::windowed`]: then the group tracks its own activity and
/// its status comes from that window alone.
#[derive(Debug)]
pub struct HeartbeatGroup {
    name: String,
    activity: Option<Heartbeat>,
    members: RwLock<Vec<(String, Member)>>,
}

impl HeartbeatGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activity: None,
            members: RwLock::new(Vec::new()),
        }
    }

    /// Group whose status is `live` while [`mark_alive`](Self::mark_alive) was
    /// called within `window`, `dead` otherwise
    pub fn windowed(name: impl Into<String>, window: Duration) -> Self {
        Self {
            activity: Some(Heartbeat::new(window)),
            ..Self::new(name)
        }
    }

    /// Startup grace for the activity window. No effect on worst-of groups.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.activity = self.activity.map(|activity| activity.with_grace(grace));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record activity for a windowed group. No effect on worst-of groups.
    pub fn mark_alive(&self) {
        match &self.activity {
            Some(activity) => activity.mark_alive(),
            None => tracing::debug!(group = %self.name, "mark_alive on group without window"),
        }
    }

    pub fn add(&self, name: impl Into<String>, member: Member) -> Result<(), LivenessError> {
        let name = name.into();
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        if members.iter().any(|(existing, _)| *existing == name) {
            return Err(LivenessError::DuplicateMember {
                group: self.name.clone(),
                name,
            });
        }
        members.push((name, member));
        Ok(())
    }

    pub fn add_heartbeat(
        &self,
        name: impl Into<String>,
        heartbeat: Arc<Heartbeat>,
    ) -> Result<(), LivenessError> {
        self.add(name, Member::Heartbeat(heartbeat))
    }

    pub fn add_group(
        &self,
        name: impl Into<String>,
        group: Arc<HeartbeatGroup>,
    ) -> Result<(), LivenessError> {
        self.add(name, Member::Group(group))
    }

    pub fn add_probe<F>(&self, name: impl Into<String>, probe: F) -> Result<(), LivenessError>
    where
        F: Fn() -> LivenessSummary + Send + Sync + 'static,
    {
        self.add(name, Member::Probe(Arc::new(probe)))
    }

    pub fn len(&self) -> usize {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summarize every member in insertion order. Never fails: a member that
    /// cannot report is listed as dead with a note.
    pub fn summary(&self) -> LivenessSummary {
        // Clone the entries so probes run without holding the lock
        let entries: Vec<(String, Member)> = self
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut members = Members::default();
        let mut worst = Liveness::Live;
        for (name, member) in entries {
            let summary = member.summary();
            worst = worst.worst(summary.status);
            members.push(name, summary);
        }

        match &self.activity {
            Some(activity) => LivenessSummary {
                members,
                ..activity.summary()
            },
            None => LivenessSummary {
                status: worst,
                last_alive: None,
                note: None,
                members,
            },
        }
    }

    pub fn is_alive(&self) -> bool {
        self.summary().is_alive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn summary_lists_every_member_in_insertion_order() {
        let root = HeartbeatGroup::new("root");
        let read = Arc::new(Heartbeat::new(Duration::from_secs(4)));
        let feed = Arc::new(Heartbeat::new(Duration::from_secs(4)));
        root.add_heartbeat("readData", read.clone()).unwrap();
        root.add_heartbeat("feedData", feed.clone()).unwrap();
        root.add_probe("broken", || panic!("probe exploded")).unwrap();

        read.mark_alive();
        advance(Duration::from_millis(10)).await;

        let summary = root.summary();
        let names: Vec<&str> = summary.members.names().collect();
        assert_eq!(names, vec!["readData", "feedData", "broken"]);
        assert_eq!(summary.members.get("readData").unwrap().status, Liveness::Live);
        assert_eq!(summary.members.get("feedData").unwrap().status, Liveness::Dead);
        let broken = summary.members.get("broken").unwrap();
        assert_eq!(broken.status, Liveness::Dead);
        assert_eq!(broken.note.as_deref(), Some("probe panicked"));
        assert_eq!(summary.status, Liveness::Dead);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let root = HeartbeatGroup::new("root");
        let hb = Arc::new(Heartbeat::new(Duration::from_secs(1)));
        root.add_heartbeat("readData", hb.clone()).unwrap();

        let err = root.add_heartbeat("readData", hb).unwrap_err();
        assert_eq!(
            err,
            LivenessError::DuplicateMember {
                group: "root".to_string(),
                name: "readData".to_string(),
            }
        );
        assert_eq!(root.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn windowed_group_uses_its_own_activity() {
        let root = HeartbeatGroup::new("root");
        let strategy = Arc::new(HeartbeatGroup::windowed("tradeDex", Duration::from_secs(8)));
        root.add_group("tradeDex", strategy.clone()).unwrap();

        strategy.mark_alive();
        assert!(root.is_alive());

        advance(Duration::from_secs(9)).await;
        let summary = root.summary();
        assert_eq!(summary.members.get("tradeDex").unwrap().status, Liveness::Dead);
        assert!(!summary.is_alive());

        strategy.mark_alive();
        assert!(root.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn nested_groups_are_preserved_in_json() {
        let root = HeartbeatGroup::new("root");
        let nested = Arc::new(HeartbeatGroup::new("nested"));
        let hb = Arc::new(Heartbeat::new(Duration::from_secs(4)));
        nested.add_heartbeat("inner", hb.clone()).unwrap();
        root.add_group("nested", nested).unwrap();
        hb.mark_alive();

        let json = serde_json::to_value(root.summary()).unwrap();
        assert_eq!(json["status"], "live");
        assert_eq!(json["members"]["nested"]["status"], "live");
        assert_eq!(json["members"]["nested"]["members"]["inner"]["status"], "live");
    }

    #[test]
    fn empty_group_is_live() {
        assert_eq!(HeartbeatGroup::new("root").summary().status, Liveness::Live);
    }
}
