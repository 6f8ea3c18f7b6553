//! Heartbeat module - Liveness tracking per recurring task
//!
//! A [`Heartbeat`] remembers when its task last succeeded and classifies that
//! against a dead period. [`HeartbeatGroup`] aggregates heartbeats and nested
//! groups into one [`LivenessSummary`] for the health endpoint.
//!
//! `mark_alive` is a single atomic `fetch_max`, so readers never observe a
//! partial timestamp and the last-alive time never moves backwards.

mod group;

pub use group::{HeartbeatGroup, Member};

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Derived liveness state, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// Succeeded within the live period (or no live period configured)
    Live,
    /// Older than the live period but not yet dead
    Stale,
    /// No success within the dead period
    Dead,
}

impl Liveness {
    pub fn is_alive(&self) -> bool {
        !matches!(self, Liveness::Dead)
    }

    /// Worst of two states
    pub fn worst(self, other: Liveness) -> Liveness {
        self.max(other)
    }
}

/// Ordered `name -> summary` entries, serialized as a JSON object
#[derive(Debug, Clone, Default)]
pub struct Members(Vec<(String, LivenessSummary)>);

impl Members {
    pub fn push(&mut self, name: String, summary: LivenessSummary) {
        self.0.push((name, summary));
    }

    pub fn get(&self, name: &str) -> Option<&LivenessSummary> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Members {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, summary) in &self.0 {
            map.serialize_entry(name, summary)?;
        }
        map.end()
    }
}

/// Snapshot of a heartbeat or group
#[derive(Debug, Clone, Serialize)]
pub struct LivenessSummary {
    pub status: Liveness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_alive: Option<DateTime<Utc>>,
    /// Reason the task last failed to mark itself alive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Members::is_empty")]
    pub members: Members,
}

impl LivenessSummary {
    /// Summary for a member whose own status computation failed
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Liveness::Dead,
            last_alive: None,
            note: Some(reason.into()),
            members: Members::default(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }
}

/// Liveness marker for one recurring task
#[derive(Debug)]
pub struct Heartbeat {
    dead_period: Duration,
    live_period: Option<Duration>,
    /// Window after creation during which a never-alive heartbeat still counts as live
    grace: Duration,
    origin: Instant,
    origin_wall: DateTime<Utc>,
    /// Millis since `origin`, plus one; zero means never marked alive
    last_alive: AtomicU64,
    note: RwLock<Option<String>>,
}

impl Heartbeat {
    pub fn new(dead_period: Duration) -> Self {
        Self {
            dead_period,
            live_period: None,
            grace: Duration::ZERO,
            origin: Instant::now(),
            origin_wall: Utc::now(),
            last_alive: AtomicU64::new(0),
            note: RwLock::new(None),
        }
    }

    /// Report `stale` once older than `live_period` (but not yet dead)
    pub fn with_live_period(mut self, live_period: Duration) -> Self {
        self.live_period = Some(live_period);
        self
    }

    /// Treat a never-alive heartbeat as live for `grace` after creation
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn dead_period(&self) -> Duration {
        self.dead_period
    }

    /// Record a success now. Clears any failure note.
    pub fn mark_alive(&self) {
        let offset = self.origin.elapsed().as_millis() as u64 + 1;
        self.last_alive.fetch_max(offset, Ordering::AcqRel);
        *self.note.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Attach a reason for the latest unsuccessful cycle
    pub fn set_note(&self, note: impl Into<String>) {
        *self.note.write().unwrap_or_else(PoisonError::into_inner) = Some(note.into());
    }

    pub fn note(&self) -> Option<String> {
        self.note
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Time elapsed since the last success, if any
    pub fn since_alive(&self) -> Option<Duration> {
        let offset = self.last_alive.load(Ordering::Acquire);
        if offset == 0 {
            return None;
        }
        let alive_at = self.origin + Duration::from_millis(offset - 1);
        Some(Instant::now().saturating_duration_since(alive_at))
    }

    pub fn last_alive(&self) -> Option<DateTime<Utc>> {
        let offset = self.last_alive.load(Ordering::Acquire);
        if offset == 0 {
            return None;
        }
        Some(self.origin_wall + chrono::Duration::milliseconds((offset - 1) as i64))
    }

    pub fn status(&self) -> Liveness {
        match self.since_alive() {
            Some(age) if age > self.dead_period => Liveness::Dead,
            Some(age) => match self.live_period {
                Some(live) if age > live => Liveness::Stale,
                _ => Liveness::Live,
            },
            None if self.origin.elapsed() > self.grace => Liveness::Dead,
            None => Liveness::Live,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status().is_alive()
    }

    pub fn summary(&self) -> LivenessSummary {
        LivenessSummary {
            status: self.status(),
            last_alive: self.last_alive(),
            note: self.note(),
            members: Members::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn dead_after_period_without_mark() {
        let hb = Heartbeat::new(Duration::from_secs(4));
        hb.mark_alive();
        assert_eq!(hb.status(), Liveness::Live);

        advance(Duration::from_secs(3)).await;
        assert_eq!(hb.status(), Liveness::Live);

        advance(Duration::from_secs(2)).await;
        assert_eq!(hb.status(), Liveness::Dead);

        hb.mark_alive();
        assert_eq!(hb.status(), Liveness::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn never_alive_is_dead_once_grace_elapses() {
        let strict = Heartbeat::new(Duration::from_secs(4));
        let lenient = Heartbeat::new(Duration::from_secs(4)).with_grace(Duration::from_secs(10));

        advance(Duration::from_millis(5)).await;
        assert_eq!(strict.status(), Liveness::Dead);
        assert_eq!(lenient.status(), Liveness::Live);
        assert!(lenient.last_alive().is_none());

        advance(Duration::from_secs(11)).await;
        assert_eq!(lenient.status(), Liveness::Dead);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_between_live_and_dead_period() {
        let hb = Heartbeat::new(Duration::from_secs(10)).with_live_period(Duration::from_secs(2));
        hb.mark_alive();

        advance(Duration::from_secs(3)).await;
        assert_eq!(hb.status(), Liveness::Stale);
        assert!(hb.is_alive());

        advance(Duration::from_secs(8)).await;
        assert_eq!(hb.status(), Liveness::Dead);
    }

    #[tokio::test(start_paused = true)]
    async fn last_alive_never_moves_backwards() {
        let hb = Arc::new(Heartbeat::new(Duration::from_secs(60)));
        advance(Duration::from_secs(5)).await;
        hb.mark_alive();
        let first = hb.last_alive().expect("marked");

        // A stale writer cannot lower the stored offset
        hb.last_alive.fetch_max(1, Ordering::AcqRel);
        assert_eq!(hb.last_alive(), Some(first));

        advance(Duration::from_secs(1)).await;
        hb.mark_alive();
        assert!(hb.last_alive().expect("marked") > first);
    }

    #[test]
    fn note_is_cleared_by_success() {
        let hb = Heartbeat::new(Duration::from_secs(60));
        hb.set_note("not_authorized");
        assert_eq!(hb.summary().note.as_deref(), Some("not_authorized"));

        hb.mark_alive();
        assert!(hb.summary().note.is_none());
    }

    #[test]
    fn liveness_orders_worst_last() {
        assert_eq!(Liveness::Live.worst(Liveness::Stale), Liveness::Stale);
        assert_eq!(Liveness::Dead.worst(Liveness::Live), Liveness::Dead);
    }
}
