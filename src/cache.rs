// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Time-keyed pose cache.
//!
//! The cache is append-only while a sampling run is active and is read
//! concurrently by the playback sync loop. Lookups scan every entry, so they
//! stay correct even if entries were appended out of time order.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::keypoint::Pose;

/// Outcome of sampling one video frame.
///
/// `pose` is `None` both when nobody was found and when inference failed.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Presentation time of the sampled frame.
    pub time: Duration,
    /// Detected pose, if any.
    pub pose: Option<Arc<Pose>>,
}

impl ProcessedFrame {
    /// Create a new processed frame.
    #[must_use]
    pub fn new(time: Duration, pose: Option<Pose>) -> Self {
        Self {
            time,
            pose: pose.map(Arc::new),
        }
    }
}

/// Append-only store of [`ProcessedFrame`]s with nearest-time lookup.
#[derive(Debug, Default)]
pub struct PoseCache {
    frames: RwLock<Vec<ProcessedFrame>>,
}

impl PoseCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ProcessedFrame>> {
        self.frames.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ProcessedFrame>> {
        self.frames.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame.
    pub fn push(&self, frame: ProcessedFrame) {
        self.write().push(frame);
    }

    /// Entry whose time is closest to `at`.
    ///
    /// Ties resolve to the entry that was appended first.
    #[must_use]
    pub fn nearest(&self, at: Duration) -> Option<ProcessedFrame> {
        let frames = self.read();
        let mut best: Option<(&ProcessedFrame, Duration)> = None;
        for frame in frames.iter() {
            let diff = frame.time.abs_diff(at);
            if best.is_none_or(|(_, min)| diff < min) {
                best = Some((frame, diff));
            }
        }
        best.map(|(frame, _)| frame.clone())
    }

    /// Pose of the entry closest to `at`.
    ///
    /// Returns `None` on an empty cache or when the closest entry has no pose.
    #[must_use]
    pub fn get_pose(&self, at: Duration) -> Option<Arc<Pose>> {
        self.nearest(at).and_then(|frame| frame.pose)
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of entries that hold a pose.
    #[must_use]
    pub fn detected_count(&self) -> usize {
        self.read().iter().filter(|f| f.pose.is_some()).count()
    }

    /// Copy of all entries in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProcessedFrame> {
        self.read().clone()
    }

    /// Discard all entries.
    pub fn clear(&self) {
        self.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::{Joint, Keypoint};

    fn pose(x: f32) -> Pose {
        Pose::new([Keypoint::new(Joint::Nose, x, 0.5, 0.9)])
    }

    fn nose_x(pose: &Pose) -> f32 {
        pose.keypoint(Joint::Nose).unwrap().x()
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_empty_cache_returns_none() {
        let cache = PoseCache::new();
        assert!(cache.is_empty());
        assert!(cache.get_pose(Duration::ZERO).is_none());
        assert!(cache.get_pose(secs(1e6)).is_none());
    }

    #[test]
    fn test_nearest_neighbor() {
        let cache = PoseCache::new();
        cache.push(ProcessedFrame::new(secs(0.0), Some(pose(0.1))));
        cache.push(ProcessedFrame::new(secs(0.5), Some(pose(0.2))));
        cache.push(ProcessedFrame::new(secs(1.2), Some(pose(0.3))));

        // |0.9 - 0.5| = 0.4, |0.9 - 1.2| = 0.3
        let found = cache.get_pose(secs(0.9)).unwrap();
        assert!((nose_x(&found) - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_two_entry_scenario_and_tie() {
        let cache = PoseCache::new();
        cache.push(ProcessedFrame::new(secs(0.0), Some(pose(0.1))));
        cache.push(ProcessedFrame::new(secs(1.0), Some(pose(0.2))));

        assert!((nose_x(&cache.get_pose(secs(0.4)).unwrap()) - 0.1).abs() < f32::EPSILON);
        assert!((nose_x(&cache.get_pose(secs(0.6)).unwrap()) - 0.2).abs() < f32::EPSILON);

        // Exact tie goes to the first entry, every time
        for _ in 0..5 {
            let tie = cache.get_pose(Duration::from_millis(500)).unwrap();
            assert!((nose_x(&tie) - 0.1).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_lookup_is_idempotent() {
        let cache = PoseCache::new();
        cache.push(ProcessedFrame::new(secs(0.2), Some(pose(0.4))));
        cache.push(ProcessedFrame::new(secs(0.3), None));

        let first = cache.get_pose(secs(0.21));
        let second = cache.get_pose(secs(0.21));
        assert!(Arc::ptr_eq(first.as_ref().unwrap(), second.as_ref().unwrap()));
    }

    #[test]
    fn test_unsorted_entries_still_resolve() {
        let cache = PoseCache::new();
        cache.push(ProcessedFrame::new(secs(2.0), Some(pose(0.2))));
        cache.push(ProcessedFrame::new(secs(0.0), Some(pose(0.0))));
        cache.push(ProcessedFrame::new(secs(1.0), Some(pose(0.1))));

        assert!((nose_x(&cache.get_pose(secs(0.1)).unwrap()) - 0.0).abs() < f32::EPSILON);
        assert!((nose_x(&cache.get_pose(secs(1.9)).unwrap()) - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_nearest_entry_without_pose_yields_none() {
        let cache = PoseCache::new();
        cache.push(ProcessedFrame::new(secs(0.0), Some(pose(0.1))));
        cache.push(ProcessedFrame::new(secs(1.0), None));

        assert!(cache.get_pose(secs(0.9)).is_none());
        assert_eq!(cache.nearest(secs(0.9)).unwrap().time, secs(1.0));
        assert_eq!(cache.detected_count(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = PoseCache::new();
        cache.push(ProcessedFrame::new(secs(0.0), Some(pose(0.1))));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.snapshot().is_empty());
    }
}
