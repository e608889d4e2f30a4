// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Video track orientation.

use std::fmt;

/// Orientation of a video track, derived from its preferred affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoOrientation {
    /// Upright portrait, the usual phone recording.
    #[default]
    Portrait,
    /// Portrait rotated by 180°.
    PortraitUpsideDown,
    /// Landscape with the top of the device to the right.
    LandscapeRight,
    /// Landscape with the top of the device to the left.
    LandscapeLeft,
}

impl VideoOrientation {
    /// Orientation from the rotation part `[a b; c d]` of a track transform.
    ///
    /// Unrecognized transforms fall back to [`VideoOrientation::Portrait`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_transform(a: f64, b: f64, c: f64, d: f64) -> Self {
        let m = [a, b, c, d].map(|v| v.round() as i8);
        match m {
            [0, 1, -1, 0] => Self::PortraitUpsideDown,
            [0, -1, 1, 0] => Self::Portrait,
            [1, 0, 0, 1] => Self::LandscapeRight,
            [-1, 0, 0, -1] => Self::LandscapeLeft,
            _ => Self::Portrait,
        }
    }

    /// Map a normalized point (origin bottom-left) to view pixels (origin
    /// top-left) for a view of `width` x `height`.
    #[must_use]
    pub fn transform_point(self, x: f32, y: f32, width: f32, height: f32) -> (f32, f32) {
        match self {
            Self::Portrait => (y * width, (1.0 - x) * height),
            Self::PortraitUpsideDown => ((1.0 - y) * width, x * height),
            Self::LandscapeRight => (x * width, (1.0 - y) * height),
            Self::LandscapeLeft => ((1.0 - x) * width, y * height),
        }
    }

    /// Whether frames are displayed taller than wide.
    #[must_use]
    pub const fn is_portrait(self) -> bool {
        matches!(self, Self::Portrait | Self::PortraitUpsideDown)
    }
}

impl fmt::Display for VideoOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Portrait => "portrait",
            Self::PortraitUpsideDown => "portrait-upside-down",
            Self::LandscapeRight => "landscape-right",
            Self::LandscapeLeft => "landscape-left",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-4 && (a.1 - b.1).abs() < 1e-4
    }

    #[test]
    fn test_from_transform() {
        assert_eq!(
            VideoOrientation::from_transform(0.0, 1.0, -1.0, 0.0),
            VideoOrientation::PortraitUpsideDown
        );
        assert_eq!(
            VideoOrientation::from_transform(0.0, -1.0, 1.0, 0.0),
            VideoOrientation::Portrait
        );
        assert_eq!(
            VideoOrientation::from_transform(1.0, 0.0, 0.0, 1.0),
            VideoOrientation::LandscapeRight
        );
        assert_eq!(
            VideoOrientation::from_transform(-1.0, 0.0, 0.0, -1.0),
            VideoOrientation::LandscapeLeft
        );
    }

    #[test]
    fn test_unknown_transform_is_portrait() {
        assert_eq!(
            VideoOrientation::from_transform(0.7, 0.7, -0.7, 0.7),
            VideoOrientation::Portrait
        );
        assert_eq!(VideoOrientation::default(), VideoOrientation::Portrait);
    }

    #[test]
    fn test_transform_point() {
        let (w, h) = (200.0, 100.0);
        assert!(close(VideoOrientation::Portrait.transform_point(0.25, 0.5, w, h), (100.0, 75.0)));
        assert!(close(
            VideoOrientation::PortraitUpsideDown.transform_point(0.25, 0.5, w, h),
            (100.0, 25.0)
        ));
        assert!(close(
            VideoOrientation::LandscapeRight.transform_point(0.25, 0.5, w, h),
            (50.0, 50.0)
        ));
        assert!(close(
            VideoOrientation::LandscapeLeft.transform_point(0.25, 0.5, w, h),
            (150.0, 50.0)
        ));
    }

    #[test]
    fn test_landscape_right_flips_y() {
        let bottom_left = VideoOrientation::LandscapeRight.transform_point(0.0, 0.0, 640.0, 480.0);
        assert!(close(bottom_left, (0.0, 480.0)));
        assert!(!VideoOrientation::LandscapeRight.is_portrait());
        assert_eq!(VideoOrientation::PortraitUpsideDown.to_string(), "portrait-upside-down");
    }
}
