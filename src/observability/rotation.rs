//! Segment rotation
//!
//! [`RotationManager`] owns the active segment pointer. Flushes hold the same
//! lock while appending, so a rotation can never redirect a batch that was
//! already bound to the previous segment; it simply waits for the append to
//! finish and swaps the pointer afterwards.

use super::retention::RetentionManager;
use super::segment::{segment_name, SegmentStore};
use crate::error::{LogError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Timer period for scheduled rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationCadence {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl RotationCadence {
    pub fn period(&self) -> Duration {
        match self {
            RotationCadence::Hourly => Duration::from_secs(3600),
            RotationCadence::Daily => Duration::from_secs(24 * 3600),
            RotationCadence::Weekly => Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// The segment currently accepting appends
#[derive(Debug, Clone)]
pub struct ActiveSegment {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Set after a failed append, which may have left a partial line behind
    needs_newline: bool,
}

/// Lock-protected rotation state
#[derive(Debug, Default)]
pub struct RotationState {
    active: Option<ActiveSegment>,
    last_name: Option<String>,
    rotations: u64,
}

impl RotationState {
    pub fn active(&self) -> Option<&ActiveSegment> {
        self.active.as_ref()
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }
}

/// Outcome of one rotation
#[derive(Debug, Clone)]
pub struct Rotation {
    /// Segment sealed by this rotation (`None` for the first one)
    pub sealed: Option<String>,
    pub active: String,
}

pub struct RotationManager {
    store: Arc<SegmentStore>,
    max_segment_bytes: u64,
    state: Mutex<RotationState>,
}

impl RotationManager {
    pub fn new(store: Arc<SegmentStore>, max_segment_bytes: u64) -> Self {
        Self {
            store,
            max_segment_bytes,
            state: Mutex::new(RotationState::default()),
        }
    }

    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    /// Acquire the segment pointer; appends and rotations serialize on this
    pub async fn lock(&self) -> MutexGuard<'_, RotationState> {
        self.state.lock().await
    }

    pub async fn active_name(&self) -> Option<String> {
        self.state.lock().await.active.as_ref().map(|a| a.name.clone())
    }

    /// Seal the active segment (if any) and start a new one
    pub async fn rotate(&self) -> Result<Rotation> {
        let mut state = self.state.lock().await;
        self.rotate_locked(&mut state).await
    }

    /// Rotation for callers already holding the lock
    pub async fn rotate_locked(&self, state: &mut RotationState) -> Result<Rotation> {
        let mut created_at = Utc::now();
        let mut name = segment_name(&created_at);

        // Two rotations within one millisecond must still get distinct,
        // increasing names.
        while state.last_name.as_deref().is_some_and(|last| name.as_str() <= last) {
            created_at += ChronoDuration::milliseconds(1);
            name = segment_name(&created_at);
        }

        // A previous process may have left a segment with this exact name
        let mut attempts = 0;
        let path = loop {
            match self.store.create(&name).await {
                Ok(path) => break path,
                Err(LogError::Persistence { ref source, .. })
                    if source.kind() == std::io::ErrorKind::AlreadyExists && attempts < 1000 =>
                {
                    attempts += 1;
                    created_at += ChronoDuration::milliseconds(1);
                    name = segment_name(&created_at);
                }
                Err(e) => return Err(e),
            }
        };
        let sealed = state.active.take().map(|a| a.name);

        tracing::info!(
            sealed = sealed.as_deref().unwrap_or("-"),
            active = %name,
            "Rotated log segment"
        );
        crate::metrics::record_rotation();

        state.active = Some(ActiveSegment {
            name: name.clone(),
            path,
            created_at,
            size_bytes: 0,
            needs_newline: false,
        });
        state.last_name = Some(name.clone());
        state.rotations += 1;

        Ok(Rotation {
            sealed,
            active: name,
        })
    }

    /// Append an encoded batch to the active segment
    ///
    /// Rotates afterwards when the segment reached `max_segment_bytes`; the
    /// returned rotation lets the caller run retention housekeeping.
    pub async fn append_locked(
        &self,
        state: &mut RotationState,
        bytes: &[u8],
    ) -> Result<Option<Rotation>> {
        if state.active.is_none() {
            self.rotate_locked(state).await?;
        }
        let active = state
            .active
            .as_mut()
            .ok_or_else(|| LogError::Config("no active segment".to_string()))?;

        let result = if active.needs_newline {
            let mut fixed = Vec::with_capacity(bytes.len() + 1);
            fixed.push(b'\n');
            fixed.extend_from_slice(bytes);
            self.store.append(&active.path, &fixed).await
        } else {
            self.store.append(&active.path, bytes).await
        };

        match result {
            Ok(size) => {
                active.size_bytes = size;
                active.needs_newline = false;
            }
            Err(e) => {
                active.needs_newline = true;
                return Err(e);
            }
        }

        if active.size_bytes >= self.max_segment_bytes {
            tracing::debug!(
                segment = %active.name,
                size = active.size_bytes,
                "Segment reached size limit"
            );
            // The batch is already on disk; a failed rotation leaves the
            // oversized segment active and the next append tries again.
            match self.rotate_locked(state).await {
                Ok(rotation) => return Ok(Some(rotation)),
                Err(e) => {
                    tracing::warn!(error = %e, "Size rotation failed, keeping current segment");
                }
            }
        }

        Ok(None)
    }

    /// Synchronous append without waiting for the lock (drop path)
    ///
    /// Returns `false` when the lock is held or no segment is active.
    pub fn try_append_blocking(&self, bytes: &[u8]) -> Result<bool> {
        let Ok(state) = self.state.try_lock() else {
            return Ok(false);
        };
        match state.active.as_ref() {
            Some(active) => {
                self.store.append_blocking(&active.path, bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop the active segment handle; later appends start a new segment
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(active) = state.active.take() {
            tracing::debug!(segment = %active.name, "Closed active segment");
        }
    }
}

/// Spawn the scheduled rotation task
///
/// Each rotation hands the sealed segment to retention housekeeping.
pub fn spawn_rotation_task(
    rotator: Arc<RotationManager>,
    retention: Arc<RetentionManager>,
    cadence: RotationCadence,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = cadence.period();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match rotator.rotate().await {
                        Ok(rotation) => {
                            retention.on_sealed(rotation.sealed.as_deref(), &rotation.active).await;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Scheduled rotation failed");
                        }
                    }
                }
            }
        }

        tracing::debug!("Rotation task shutting down");
    })
}
