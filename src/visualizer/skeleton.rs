// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use crate::keypoint::{Joint, Pose};

/// A pair of joints joined by a limb when rendering a skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkeletonConnection {
    /// Start joint.
    pub from: Joint,
    /// End joint.
    pub to: Joint,
}

impl SkeletonConnection {
    const fn new(from: Joint, to: Joint) -> Self {
        Self { from, to }
    }

    /// Whether both endpoints are present and reliable in `pose`.
    #[must_use]
    pub fn is_drawable(&self, pose: &Pose) -> bool {
        pose.has_reliable_keypoint(self.from) && pose.has_reliable_keypoint(self.to)
    }
}

/// Body skeleton structure (pairs of joints)
/// Defines which joints connect to form the pose skeleton
pub const SKELETON: [SkeletonConnection; 18] = [
    // Head
    SkeletonConnection::new(Joint::Nose, Joint::Neck),
    SkeletonConnection::new(Joint::LeftEye, Joint::Nose),
    SkeletonConnection::new(Joint::RightEye, Joint::Nose),
    SkeletonConnection::new(Joint::LeftEar, Joint::LeftEye),
    SkeletonConnection::new(Joint::RightEar, Joint::RightEye),
    // Torso
    SkeletonConnection::new(Joint::Neck, Joint::LeftShoulder),
    SkeletonConnection::new(Joint::Neck, Joint::RightShoulder),
    SkeletonConnection::new(Joint::LeftShoulder, Joint::LeftHip),
    SkeletonConnection::new(Joint::RightShoulder, Joint::RightHip),
    SkeletonConnection::new(Joint::LeftHip, Joint::RightHip),
    // Left arm
    SkeletonConnection::new(Joint::LeftShoulder, Joint::LeftElbow),
    SkeletonConnection::new(Joint::LeftElbow, Joint::LeftWrist),
    // Right arm
    SkeletonConnection::new(Joint::RightShoulder, Joint::RightElbow),
    SkeletonConnection::new(Joint::RightElbow, Joint::RightWrist),
    // Left leg
    SkeletonConnection::new(Joint::LeftHip, Joint::LeftKnee),
    SkeletonConnection::new(Joint::LeftKnee, Joint::LeftAnkle),
    // Right leg
    SkeletonConnection::new(Joint::RightHip, Joint::RightKnee),
    SkeletonConnection::new(Joint::RightKnee, Joint::RightAnkle),
];

/// Limb color indices mapping to `POSE_COLORS`
/// Mapping: face=green, torso=pink, arms=blue, legs=orange
pub const LIMB_COLOR_INDICES: [usize; 18] = [16, 16, 16, 16, 16, 7, 7, 7, 7, 7, 9, 9, 9, 9, 0, 0, 0, 0];

/// Pose palette index for a joint's marker.
#[must_use]
pub const fn joint_color_index(joint: Joint) -> usize {
    match joint {
        Joint::Nose | Joint::LeftEye | Joint::RightEye | Joint::LeftEar | Joint::RightEar => 16,
        Joint::Neck | Joint::Root => 7,
        Joint::LeftShoulder
        | Joint::RightShoulder
        | Joint::LeftElbow
        | Joint::RightElbow
        | Joint::LeftWrist
        | Joint::RightWrist => 9,
        Joint::LeftHip
        | Joint::RightHip
        | Joint::LeftKnee
        | Joint::RightKnee
        | Joint::LeftAnkle
        | Joint::RightAnkle => 0,
    }
}
