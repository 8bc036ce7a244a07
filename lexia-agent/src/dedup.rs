//! Provider message deduplication.
//!
//! WhatsApp redelivers webhooks it considers unacknowledged. Every provider
//! message id is recorded the first time it is seen; later deliveries with
//! the same id are reported as duplicates and must not produce a second reply.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;

/// Set of already-processed message ids.
#[derive(Debug, Clone, Default)]
pub struct DedupGuard {
    seen: Arc<DashMap<String, Instant>>,
    /// `None` keeps ids for the process lifetime.
    retention: Option<Duration>,
}

impl DedupGuard {
    /// Guard that never forgets an id.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Guard that forgets ids after `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            seen: Arc::new(DashMap::new()),
            retention: Some(retention),
        }
    }

    /// Build a guard from an optional retention window in seconds.
    pub fn from_retention_secs(retention_secs: Option<u64>) -> Self {
        match retention_secs {
            Some(secs) => Self::with_retention(Duration::from_secs(secs)),
            None => Self::unbounded(),
        }
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    /// Check whether `message_id` was already processed, recording it if not.
    ///
    /// Check and record happen under the same map entry lock, so of any
    /// number of concurrent callers with one id exactly one gets `false`.
    /// Ids are matched exactly. Absent or empty ids are never duplicates and
    /// are never recorded.
    pub fn is_duplicate(&self, message_id: Option<&str>) -> bool {
        self.is_duplicate_at(message_id, Instant::now())
    }

    fn is_duplicate_at(&self, message_id: Option<&str>, now: Instant) -> bool {
        let Some(id) = message_id.filter(|id| !id.is_empty()) else {
            return false;
        };

        match self.seen.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.is_expired(*entry.get(), now) {
                    entry.insert(now);
                    false
                } else {
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                false
            }
        }
    }

    fn is_expired(&self, seen_at: Instant, now: Instant) -> bool {
        self.retention
            .is_some_and(|retention| now.saturating_duration_since(seen_at) >= retention)
    }

    /// Drop ids older than the retention window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        if self.retention.is_none() {
            return 0;
        }
        let before = self.seen.len();
        self.seen.retain(|_, seen_at| !self.is_expired(*seen_at, now));
        before.saturating_sub(self.seen.len())
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Spawn a background task that purges expired ids every `interval`.
    ///
    /// Returns `None` for an unbounded guard, which has nothing to purge.
    pub fn spawn_sweeper(&self, interval: Duration) -> Option<JoinHandle<()>> {
        self.retention?;
        let guard = self.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = guard.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, remaining = guard.len(), "Purged expired message ids");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_is_not_duplicate() {
        let guard = DedupGuard::unbounded();
        assert!(!guard.is_duplicate(Some("m1")));
        assert!(guard.is_duplicate(Some("m1")));
        assert!(guard.is_duplicate(Some("m1")));
        assert!(!guard.is_duplicate(Some("m2")));
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn test_missing_or_empty_ids_are_never_recorded() {
        let guard = DedupGuard::unbounded();
        assert!(!guard.is_duplicate(None));
        assert!(!guard.is_duplicate(None));
        assert!(!guard.is_duplicate(Some("")));
        assert!(!guard.is_duplicate(Some("")));
        assert!(guard.is_empty());
    }

    #[test]
    fn test_ids_are_matched_exactly() {
        let guard = DedupGuard::unbounded();
        assert!(!guard.is_duplicate(Some(" ")));
        assert!(guard.is_duplicate(Some(" ")));

        assert!(!guard.is_duplicate(Some("wamid.1")));
        assert!(!guard.is_duplicate(Some(" wamid.1 ")));
        assert!(guard.is_duplicate(Some(" wamid.1 ")));
        assert_eq!(guard.len(), 3);
    }

    #[test]
    fn test_unbounded_never_expires() {
        let guard = DedupGuard::unbounded();
        let start = Instant::now();
        assert!(!guard.is_duplicate_at(Some("m1"), start));
        let much_later = start + Duration::from_secs(365 * 24 * 3600);
        assert!(guard.is_duplicate_at(Some("m1"), much_later));
        assert_eq!(guard.purge_expired_at(much_later), 0);
    }

    #[test]
    fn test_retention_window() {
        let guard = DedupGuard::with_retention(Duration::from_secs(60));
        let start = Instant::now();

        assert!(!guard.is_duplicate_at(Some("m1"), start));
        assert!(guard.is_duplicate_at(Some("m1"), start + Duration::from_secs(59)));
        // Expired: treated as new and re-recorded.
        assert!(!guard.is_duplicate_at(Some("m1"), start + Duration::from_secs(60)));
        assert!(guard.is_duplicate_at(Some("m1"), start + Duration::from_secs(61)));
    }

    #[test]
    fn test_purge_expired() {
        let guard = DedupGuard::with_retention(Duration::from_secs(10));
        let start = Instant::now();
        guard.is_duplicate_at(Some("old"), start);
        guard.is_duplicate_at(Some("new"), start + Duration::from_secs(8));

        let removed = guard.purge_expired_at(start + Duration::from_secs(12));
        assert_eq!(removed, 1);
        assert_eq!(guard.len(), 1);
        assert!(guard.is_duplicate_at(Some("new"), start + Duration::from_secs(12)));
    }

    #[test]
    fn test_from_retention_secs() {
        assert!(DedupGuard::from_retention_secs(None).retention().is_none());
        assert_eq!(
            DedupGuard::from_retention_secs(Some(30)).retention(),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn test_concurrent_check_admits_exactly_one() {
        let guard = DedupGuard::unbounded();
        let mut handles = Vec::new();
        for _ in 0..64 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard.is_duplicate(Some("wamid.race"))
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_sweeper_only_for_bounded_guard() {
        assert!(DedupGuard::unbounded()
            .spawn_sweeper(Duration::from_secs(1))
            .is_none());

        let handle = DedupGuard::with_retention(Duration::from_secs(1))
            .spawn_sweeper(Duration::from_secs(1))
            .unwrap();
        handle.abort();
    }
}
