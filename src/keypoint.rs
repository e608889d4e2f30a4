// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Keypoint and pose value types.
//!
//! A [`Pose`] is a sparse map from [`Joint`] to [`Keypoint`]: a joint that is
//! missing from the map was not detected, which is distinct from a joint that
//! was detected with low confidence.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use crate::error::PoseError;

/// Keypoints at or below this confidence are not drawn.
pub const RELIABILITY_THRESHOLD: f32 = 0.1;

/// Named body joints reported by the pose model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    Neck,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    Root,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    /// Number of joints.
    pub const COUNT: usize = 19;

    /// Every joint, head to feet.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::Neck,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::Root,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// Joint corresponding to a COCO-17 keypoint index.
    ///
    /// COCO has no neck or root, so those joints are never produced here.
    #[must_use]
    pub const fn from_coco_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftEye),
            2 => Some(Self::RightEye),
            3 => Some(Self::LeftEar),
            4 => Some(Self::RightEar),
            5 => Some(Self::LeftShoulder),
            6 => Some(Self::RightShoulder),
            7 => Some(Self::LeftElbow),
            8 => Some(Self::RightElbow),
            9 => Some(Self::LeftWrist),
            10 => Some(Self::RightWrist),
            11 => Some(Self::LeftHip),
            12 => Some(Self::RightHip),
            13 => Some(Self::LeftKnee),
            14 => Some(Self::RightKnee),
            15 => Some(Self::LeftAnkle),
            16 => Some(Self::RightAnkle),
            _ => None,
        }
    }

    /// Snake-case name, e.g. `left_shoulder`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::Neck => "neck",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::Root => "root",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Joint {
    type Err = PoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|joint| joint.name() == normalized)
            .ok_or_else(|| PoseError::ConfigError(format!("Unknown joint: {s}")))
    }
}

/// A single detected body joint.
///
/// Coordinates are normalized to `[0, 1]` with the origin at the bottom-left
/// of the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    joint: Joint,
    x: f32,
    y: f32,
    confidence: f32,
}

impl Keypoint {
    /// Create a new keypoint.
    #[must_use]
    pub const fn new(joint: Joint, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            joint,
            x,
            y,
            confidence,
        }
    }

    /// Joint this keypoint belongs to.
    #[must_use]
    pub const fn joint(&self) -> Joint {
        self.joint
    }

    /// Normalized x coordinate.
    #[must_use]
    pub const fn x(&self) -> f32 {
        self.x
    }

    /// Normalized y coordinate (bottom-left origin).
    #[must_use]
    pub const fn y(&self) -> f32 {
        self.y
    }

    /// Detection confidence in `[0, 1]`.
    #[must_use]
    pub const fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Whether the keypoint is confident enough to render.
    ///
    /// The threshold is strict: a confidence of exactly
    /// [`RELIABILITY_THRESHOLD`] is not reliable.
    #[must_use]
    pub fn is_reliable(&self) -> bool {
        self.confidence > RELIABILITY_THRESHOLD
    }

    /// Convert to top-left-origin pixel coordinates.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = ((1.0 - self.y) * height as f32) as i32;
        (px, py)
    }
}

/// A detected human pose.
///
/// Built once per inference result and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Pose {
    keypoints: HashMap<Joint, Keypoint>,
    timestamp: SystemTime,
}

impl Pose {
    /// Create a pose from detected keypoints, stamped with the current time.
    ///
    /// If a joint appears more than once, the last keypoint for it wins.
    #[must_use]
    pub fn new(keypoints: impl IntoIterator<Item = Keypoint>) -> Self {
        Self::with_timestamp(keypoints, SystemTime::now())
    }

    /// Create a pose with an explicit creation timestamp.
    #[must_use]
    pub fn with_timestamp(
        keypoints: impl IntoIterator<Item = Keypoint>,
        timestamp: SystemTime,
    ) -> Self {
        let keypoints = keypoints.into_iter().map(|kp| (kp.joint, kp)).collect();
        Self {
            keypoints,
            timestamp,
        }
    }

    /// Keypoint for a joint, if it was detected.
    #[must_use]
    pub fn keypoint(&self, joint: Joint) -> Option<&Keypoint> {
        self.keypoints.get(&joint)
    }

    /// Whether a joint was detected and is reliable.
    #[must_use]
    pub fn has_reliable_keypoint(&self, joint: Joint) -> bool {
        self.keypoint(joint).is_some_and(Keypoint::is_reliable)
    }

    /// When this pose was created.
    #[must_use]
    pub const fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Number of detected joints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// Whether no joints were detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Iterate keypoints in [`Joint::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = &Keypoint> + '_ {
        Joint::ALL.iter().filter_map(|joint| self.keypoints.get(joint))
    }

    /// Number of reliable keypoints.
    #[must_use]
    pub fn reliable_count(&self) -> usize {
        self.keypoints.values().filter(|kp| kp.is_reliable()).count()
    }

    /// Mean confidence over detected joints, `0.0` for an empty pose.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_confidence(&self) -> f32 {
        if self.keypoints.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.keypoints.values().map(Keypoint::confidence).sum();
        sum / self.keypoints.len() as f32
    }
}
