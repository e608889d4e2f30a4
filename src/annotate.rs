// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::keypoint::Pose;
use crate::visualizer::{Color, SKELETON};

/// Find the next available run directory (process, process2, process3, etc.)
pub fn find_next_run_dir<P: AsRef<Path>>(base: P, prefix: &str) -> PathBuf {
    let base = base.as_ref();
    let first = base.join(prefix);
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|i| base.join(format!("{prefix}{i}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Line thickness and keypoint radius scaled to the image size.
fn stroke_sizes(width: u32, height: u32) -> (i32, i32) {
    let side = width.min(height);
    let thickness = i32::try_from(side / 300).unwrap_or(1).max(1);
    (thickness, thickness + 2)
}

/// Draw the reliable part of `pose` onto a copy of `image`.
///
/// A connection is drawn only when both of its joints are reliable.
#[must_use]
pub fn draw_pose(image: &DynamicImage, pose: &Pose) -> DynamicImage {
    let mut img = image.to_rgb8();
    draw_pose_mut(&mut img, pose);
    DynamicImage::ImageRgb8(img)
}

/// Draw the reliable part of `pose` onto `img` in place.
#[allow(clippy::cast_precision_loss)]
pub fn draw_pose_mut(img: &mut RgbImage, pose: &Pose) {
    let (width, height) = img.dimensions();
    let (thickness, radius) = stroke_sizes(width, height);

    for (i, connection) in SKELETON.iter().enumerate() {
        if !connection.is_drawable(pose) {
            continue;
        }
        let (Some(from), Some(to)) = (pose.keypoint(connection.from), pose.keypoint(connection.to)) else {
            continue;
        };
        let color: Rgb<u8> = Color::for_limb(i).into();
        let (x1, y1) = from.to_pixel(width, height);
        let (x2, y2) = to.to_pixel(width, height);
        // Offset parallel segments for thickness.
        for t in 0..thickness {
            let o = (t - thickness / 2) as f32;
            draw_line_segment_mut(img, (x1 as f32 + o, y1 as f32), (x2 as f32 + o, y2 as f32), color);
            draw_line_segment_mut(img, (x1 as f32, y1 as f32 + o), (x2 as f32, y2 as f32 + o), color);
        }
    }

    for keypoint in pose.iter().filter(|k| k.is_reliable()) {
        let center = keypoint.to_pixel(width, height);
        draw_filled_circle_mut(img, center, radius, Color::for_joint(keypoint.joint()).into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::{Joint, Keypoint};

    #[test]
    fn test_draws_reliable_connection() {
        let pose = Pose::new([
            Keypoint::new(Joint::LeftHip, 0.25, 0.5, 0.9),
            Keypoint::new(Joint::RightHip, 0.75, 0.5, 0.9),
        ]);
        let image = DynamicImage::new_rgb8(100, 100);
        let out = draw_pose(&image, &pose).to_rgb8();

        // Midpoint of the hip line, away from the keypoint markers.
        assert_ne!(*out.get_pixel(50, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_skips_unreliable_keypoints() {
        let pose = Pose::new([
            Keypoint::new(Joint::LeftHip, 0.25, 0.5, 0.9),
            Keypoint::new(Joint::RightHip, 0.75, 0.5, 0.1),
        ]);
        let image = DynamicImage::new_rgb8(100, 100);
        let out = draw_pose(&image, &pose).to_rgb8();

        assert_eq!(*out.get_pixel(50, 50), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(75, 50), Rgb([0, 0, 0]));
        assert_ne!(*out.get_pixel(25, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_find_next_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_next_run_dir(dir.path(), "process"), dir.path().join("process"));

        std::fs::create_dir(dir.path().join("process")).unwrap();
        assert_eq!(find_next_run_dir(dir.path(), "process"), dir.path().join("process2"));
    }
}
