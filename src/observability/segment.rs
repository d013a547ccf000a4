//! On-disk segment storage
//!
//! Layout:
//!
//! ```text
//! <storage_dir>/segment-20261018T093000250Z.log   live segments
//! <storage_dir>/archive/segment-...log            archived segments
//! ```
//!
//! Segment names embed their creation time with millisecond precision, so
//! lexical order is creation order.

use crate::error::{LogError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".log";
const NAME_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";
pub const ARCHIVE_DIR: &str = "archive";

/// Where a sealed or active segment currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentLocation {
    Live,
    Archived,
}

/// A segment file found on disk
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    pub name: String,
    pub path: PathBuf,
    pub location: SegmentLocation,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Deterministic segment name for a creation time
pub fn segment_name(created_at: &DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        SEGMENT_PREFIX,
        created_at.format(NAME_TIME_FORMAT),
        SEGMENT_SUFFIX
    )
}

/// Creation time encoded in a segment name, `None` for foreign files
pub fn parse_segment_name(name: &str) -> Option<DateTime<Utc>> {
    let stem = name
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?;
    NaiveDateTime::parse_from_str(stem, NAME_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Filesystem handle for the live and archive areas
#[derive(Debug, Clone)]
pub struct SegmentStore {
    root: PathBuf,
    archive: PathBuf,
}

impl SegmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let archive = root.join(ARCHIVE_DIR);
        Self { root, archive }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive
    }

    pub fn live_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn archived_path(&self, name: &str) -> PathBuf {
        self.archive.join(name)
    }

    /// Create both areas and verify they are writable
    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.root, &self.archive] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                LogError::Config(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }

        let probe = self.root.join(".write-probe");
        tokio::fs::write(&probe, b"")
            .await
            .map_err(|e| LogError::Config(format!("{} is not writable: {}", self.root.display(), e)))?;
        let _ = tokio::fs::remove_file(&probe).await;

        Ok(())
    }

    /// Create an empty live segment; fails if the name is already taken
    pub async fn create(&self, name: &str) -> Result<PathBuf> {
        let path = self.live_path(name);
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| LogError::persistence(&path, e))?;
        Ok(path)
    }

    /// Append bytes and sync them to disk; returns the segment size afterwards
    pub async fn append(&self, path: &Path, bytes: &[u8]) -> Result<u64> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| LogError::persistence(path, e))?;

        file.write_all(bytes)
            .await
            .map_err(|e| LogError::persistence(path, e))?;
        file.sync_data()
            .await
            .map_err(|e| LogError::persistence(path, e))?;

        let meta = file
            .metadata()
            .await
            .map_err(|e| LogError::persistence(path, e))?;
        Ok(meta.len())
    }

    /// Blocking append used when no runtime is available (drop path)
    pub fn append_blocking(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| LogError::persistence(path, e))?;
        file.write_all(bytes)
            .and_then(|_| file.sync_data())
            .map_err(|e| LogError::persistence(path, e))
    }

    /// Segments in one area, oldest first
    pub async fn list(&self, location: SegmentLocation) -> Result<Vec<SegmentInfo>> {
        let dir = match location {
            SegmentLocation::Live => &self.root,
            SegmentLocation::Archived => &self.archive,
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound
                && location == SegmentLocation::Archived =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(LogError::storage(dir, e)),
        };

        let mut segments = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LogError::storage(dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(created_at) = parse_segment_name(&name) else {
                continue;
            };

            // A segment may be moved or removed between listing and stat
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(LogError::storage(entry.path(), e)),
            };
            let modified_at = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or(created_at);

            segments.push(SegmentInfo {
                name,
                path: entry.path(),
                location,
                created_at,
                modified_at,
                size_bytes: meta.len(),
            });
        }

        segments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(segments)
    }

    /// Live and archived segments together, newest first
    ///
    /// A segment archived between the two listings shows up in both; only
    /// its archived entry is kept.
    pub async fn list_newest_first(&self) -> Result<Vec<SegmentInfo>> {
        let live = self.list(SegmentLocation::Live).await?;
        let mut all = self.list(SegmentLocation::Archived).await?;
        let archived: HashSet<String> = all.iter().map(|s| s.name.clone()).collect();
        all.extend(live.into_iter().filter(|s| !archived.contains(&s.name)));
        all.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_segment_name_round_trip() {
        let ts = DateTime::parse_from_rfc3339("2026-10-18T09:30:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        let name = segment_name(&ts);
        assert_eq!(name, "segment-20261018T093000250Z.log");
        assert_eq!(parse_segment_name(&name), Some(ts));
    }

    #[test]
    fn test_names_sort_by_time() {
        let a = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let b = DateTime::from_timestamp_millis(1_700_000_000_001).unwrap();
        let c = DateTime::from_timestamp_millis(1_800_000_000_000).unwrap();
        assert!(segment_name(&a) < segment_name(&b));
        assert!(segment_name(&b) < segment_name(&c));
    }

    #[test]
    fn test_foreign_names_ignored() {
        assert!(parse_segment_name("notes.txt").is_none());
        assert!(parse_segment_name("segment-garbage.log").is_none());
        assert!(parse_segment_name(".write-probe").is_none());
    }

    #[tokio::test]
    async fn test_create_append_list() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let name = segment_name(&Utc::now());
        let path = store.create(&name).await.unwrap();
        assert!(store.create(&name).await.is_err());

        let size = store.append(&path, b"one\n").await.unwrap();
        assert_eq!(size, 4);
        let size = store.append(&path, b"two\n").await.unwrap();
        assert_eq!(size, 8);

        std::fs::write(dir.path().join("README"), "not a segment").unwrap();

        let live = store.list(SegmentLocation::Live).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name, name);
        assert_eq!(live[0].size_bytes, 8);
        assert!(store.list(SegmentLocation::Archived).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_combined_listing_keeps_one_entry_per_name() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let older = segment_name(&DateTime::from_timestamp_millis(1_760_000_000_000).unwrap());
        let newer = segment_name(&DateTime::from_timestamp_millis(1_760_000_360_000).unwrap());
        store.create(&older).await.unwrap();
        store.create(&newer).await.unwrap();
        // Caught mid-archive: the same name in both areas
        std::fs::write(store.archived_path(&older), b"").unwrap();

        let all = store.list_newest_first().await.unwrap();
        let names: Vec<&str> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![newer.as_str(), older.as_str()]);
        assert_eq!(all[1].location, SegmentLocation::Archived);
    }

    #[tokio::test]
    async fn test_missing_root_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::new(dir.path().join("nope"));
        let err = store.list(SegmentLocation::Live).await.unwrap_err();
        assert_eq!(err.kind(), "storage_unreadable");
    }
}
