//! Segment retention
//!
//! Sealed segments move through `live -> archived -> deleted`, never
//! backwards:
//!
//! - live segments untouched for `archive_after_days` are renamed into the
//!   archive area
//! - archived segments untouched for `delete_after_days` are removed
//! - live segments beyond `max_segments` are removed oldest first, whatever
//!   their age
//!
//! The active segment (and anything named after it) is never touched. A
//! failure on one segment is logged and counted; the pass continues and the
//! next scheduled pass retries it.

use super::segment::{SegmentInfo, SegmentLocation, SegmentStore};
use crate::error::{LogError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retention thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub archive_after_days: u64,
    pub delete_after_days: u64,
    pub max_segments: usize,
}

/// Result of one retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionStats {
    pub archived: u64,
    pub deleted: u64,
    pub trimmed: u64,
    pub failures: u64,
}

impl RetentionStats {
    fn merge(&mut self, other: RetentionStats) {
        self.archived += other.archived;
        self.deleted += other.deleted;
        self.trimmed += other.trimmed;
        self.failures += other.failures;
    }

    pub fn is_empty(&self) -> bool {
        self.archived == 0 && self.deleted == 0 && self.trimmed == 0 && self.failures == 0
    }
}

pub struct RetentionManager {
    store: Arc<SegmentStore>,
    policy: RetentionPolicy,
}

impl RetentionManager {
    pub fn new(store: Arc<SegmentStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Full pass: archive aged live segments, enforce the segment ceiling,
    /// then delete expired archived segments
    pub async fn apply(
        &self,
        archive_after_days: u64,
        delete_after_days: u64,
        now: DateTime<Utc>,
        active: Option<&str>,
    ) -> Result<RetentionStats> {
        let mut stats = self.archive(archive_after_days, now, active).await?;
        stats.merge(self.enforce_ceiling(active).await?);
        stats.merge(self.purge(delete_after_days, now).await?);

        if !stats.is_empty() {
            tracing::info!(
                archived = stats.archived,
                deleted = stats.deleted,
                trimmed = stats.trimmed,
                failures = stats.failures,
                "Retention pass completed"
            );
        }
        crate::metrics::record_retention(&stats);

        Ok(stats)
    }

    /// [`apply`](Self::apply) with the configured thresholds
    pub async fn apply_policy(&self, now: DateTime<Utc>, active: Option<&str>) -> Result<RetentionStats> {
        self.apply(
            self.policy.archive_after_days,
            self.policy.delete_after_days,
            now,
            active,
        )
        .await
    }

    /// Move live segments last modified more than `older_than_days` ago
    /// into the archive area
    pub async fn archive(
        &self,
        older_than_days: u64,
        now: DateTime<Utc>,
        active: Option<&str>,
    ) -> Result<RetentionStats> {
        let cutoff = cutoff(now, older_than_days);
        let mut stats = RetentionStats::default();

        for segment in self.store.list(SegmentLocation::Live).await? {
            if is_protected(&segment, active) || segment.modified_at >= cutoff {
                continue;
            }

            match self.move_to_archive(&segment).await {
                Ok(true) => {
                    tracing::debug!(segment = %segment.name, "Archived segment");
                    stats.archived += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    let err = LogError::retention(&segment.path, e);
                    tracing::warn!(error = %err, "Failed to archive segment");
                    stats.failures += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Permanently remove archived segments last modified more than
    /// `older_than_days` ago
    pub async fn purge(&self, older_than_days: u64, now: DateTime<Utc>) -> Result<RetentionStats> {
        let cutoff = cutoff(now, older_than_days);
        let mut stats = RetentionStats::default();

        for segment in self.store.list(SegmentLocation::Archived).await? {
            if segment.modified_at >= cutoff {
                continue;
            }
            if self.remove(&segment, &mut stats).await {
                stats.deleted += 1;
            }
        }

        Ok(stats)
    }

    /// Delete the oldest live segments above `max_segments`
    pub async fn enforce_ceiling(&self, active: Option<&str>) -> Result<RetentionStats> {
        let mut stats = RetentionStats::default();
        let live = self.store.list(SegmentLocation::Live).await?;
        if live.len() <= self.policy.max_segments {
            return Ok(stats);
        }

        let excess = live.len() - self.policy.max_segments;
        for segment in live.iter().filter(|s| !is_protected(s, active)).take(excess) {
            if self.remove(segment, &mut stats).await {
                stats.trimmed += 1;
            }
        }

        if stats.trimmed > 0 {
            tracing::warn!(
                trimmed = stats.trimmed,
                max_segments = self.policy.max_segments,
                "Live segment count exceeded ceiling"
            );
        }

        Ok(stats)
    }

    /// Housekeeping after a rotation sealed a segment
    pub async fn on_sealed(&self, sealed: Option<&str>, active: &str) {
        if let Some(sealed) = sealed {
            tracing::debug!(segment = %sealed, "Segment sealed");
        }
        if let Err(e) = self.apply_policy(Utc::now(), Some(active)).await {
            tracing::error!(error = %e, "Retention after rotation failed");
        }
    }

    /// Rename a live segment into the archive area
    ///
    /// `Ok(false)` when the segment is already gone. A missing archive
    /// directory is recreated.
    async fn move_to_archive(&self, segment: &SegmentInfo) -> std::io::Result<bool> {
        let target = self.store.archived_path(&segment.name);
        match tokio::fs::rename(&segment.path, &target).await {
            Ok(()) => return Ok(true),
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
            Err(_) => {}
        }

        if !tokio::fs::try_exists(&segment.path).await? {
            return Ok(false);
        }
        tracing::warn!(dir = %self.store.archive_dir().display(), "Archive directory missing, recreating");
        tokio::fs::create_dir_all(self.store.archive_dir()).await?;
        match tokio::fs::rename(&segment.path, &target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, segment: &SegmentInfo, stats: &mut RetentionStats) -> bool {
        match tokio::fs::remove_file(&segment.path).await {
            Ok(()) => {
                tracing::debug!(segment = %segment.name, location = ?segment.location, "Deleted segment");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                let err = LogError::retention(&segment.path, e);
                tracing::warn!(error = %err, "Failed to delete segment");
                stats.failures += 1;
                false
            }
        }
    }
}

fn cutoff(now: DateTime<Utc>, days: u64) -> DateTime<Utc> {
    let days = i64::try_from(days).unwrap_or(i64::MAX / 86_400_000);
    now - ChronoDuration::days(days.min(365_000))
}

fn is_protected(segment: &SegmentInfo, active: Option<&str>) -> bool {
    active.is_some_and(|active| segment.name.as_str() >= active)
}

/// Spawn the periodic retention task
///
/// `active` is read from the rotation manager at each pass.
pub fn spawn_retention_task(
    retention: Arc<RetentionManager>,
    rotator: Arc<super::rotation::RotationManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let active = rotator.active_name().await;
                    if let Err(e) = retention.apply_policy(Utc::now(), active.as_deref()).await {
                        tracing::error!(error = %e, "Scheduled retention failed");
                    }
                }
            }
        }

        tracing::debug!("Retention task shutting down");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::segment::segment_name;
    use tempfile::TempDir;

    async fn create_store(dir: &TempDir) -> Arc<SegmentStore> {
        let store = Arc::new(SegmentStore::new(dir.path()));
        store.ensure_dirs().await.unwrap();
        store
    }

    async fn create_segments(store: &SegmentStore, count: i64) -> Vec<String> {
        let base = DateTime::from_timestamp_millis(1_760_000_000_000).unwrap();
        let mut names = Vec::new();
        for i in 0..count {
            let name = segment_name(&(base + ChronoDuration::hours(i)));
            let path = store.create(&name).await.unwrap();
            store.append(&path, b"x\n").await.unwrap();
            names.push(name);
        }
        names
    }

    fn policy(max_segments: usize) -> RetentionPolicy {
        RetentionPolicy {
            archive_after_days: 7,
            delete_after_days: 30,
            max_segments,
        }
    }

    #[tokio::test]
    async fn test_archive_then_delete() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir).await;
        let names = create_segments(&store, 3).await;
        let active = names.last().cloned();
        let retention = RetentionManager::new(store.clone(), policy(100));

        // Nothing is old yet
        let stats = retention.apply(7, 30, Utc::now(), active.as_deref()).await.unwrap();
        assert!(stats.is_empty());

        // Ten days later: sealed segments archived, active untouched
        let later = Utc::now() + ChronoDuration::days(10);
        let stats = retention.apply(7, 30, later, active.as_deref()).await.unwrap();
        assert_eq!(stats.archived, 2);
        assert_eq!(stats.deleted, 0);

        // Re-running is a no-op
        let stats = retention.apply(7, 30, later, active.as_deref()).await.unwrap();
        assert!(stats.is_empty());

        let live = store.list(SegmentLocation::Live).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(Some(&live[0].name), active.as_ref());

        // Forty days later: archived segments deleted
        let much_later = Utc::now() + ChronoDuration::days(40);
        let stats = retention.purge(30, much_later).await.unwrap();
        assert_eq!(stats.deleted, 2);
        assert!(store.list(SegmentLocation::Archived).await.unwrap().is_empty());

        let stats = retention.purge(30, much_later).await.unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn test_ceiling_trims_oldest_regardless_of_age() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir).await;
        let names = create_segments(&store, 5).await;
        let retention = RetentionManager::new(store.clone(), policy(2));

        let stats = retention.enforce_ceiling(names.last().map(String::as_str)).await.unwrap();
        assert_eq!(stats.trimmed, 3);

        let live: Vec<String> = store
            .list(SegmentLocation::Live)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(live, names[3..].to_vec());
    }

    #[tokio::test]
    async fn test_active_segment_never_archived() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir).await;
        let names = create_segments(&store, 2).await;
        let retention = RetentionManager::new(store.clone(), policy(10));

        let stats = retention
            .archive(0, Utc::now() + ChronoDuration::days(1), Some(&names[1]))
            .await
            .unwrap();
        assert_eq!(stats.archived, 1);
        assert!(store.live_path(&names[1]).exists());
        assert!(store.archived_path(&names[0]).exists());
    }

    #[tokio::test]
    async fn test_failed_segment_counted_and_others_processed() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir).await;
        let names = create_segments(&store, 4).await;
        let retention = RetentionManager::new(store.clone(), policy(10));

        // A non-empty directory squats on the second segment's archive name
        let blocked = store.archived_path(&names[1]);
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), b"x").unwrap();

        let later = Utc::now() + ChronoDuration::days(10);
        let stats = retention.archive(7, later, Some(&names[3])).await.unwrap();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.archived, 2);
        assert!(store.archived_path(&names[0]).is_file());
        assert!(store.archived_path(&names[2]).is_file());
        assert!(store.live_path(&names[1]).exists());

        // Once the obstacle is gone the next pass picks it up
        std::fs::remove_dir_all(&blocked).unwrap();
        let stats = retention.archive(7, later, Some(&names[3])).await.unwrap();
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.failures, 0);
    }

    #[tokio::test]
    async fn test_missing_archive_dir_is_recreated() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir).await;
        let names = create_segments(&store, 2).await;
        let retention = RetentionManager::new(store.clone(), policy(10));

        std::fs::remove_dir(store.archive_dir()).unwrap();

        let later = Utc::now() + ChronoDuration::days(10);
        let stats = retention.archive(7, later, Some(&names[1])).await.unwrap();
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.failures, 0);
        assert!(store.archived_path(&names[0]).is_file());
    }

    #[test]
    fn test_cutoff_saturates() {
        let now = Utc::now();
        assert!(cutoff(now, u64::MAX) < now);
        assert_eq!(cutoff(now, 0), now);
    }
}
