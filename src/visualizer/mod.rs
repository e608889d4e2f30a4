// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Skeleton structure and colors for pose overlays.

/// Color definitions and palettes.
pub mod color;

/// Joint connectivity.
pub mod skeleton;

pub use color::Color;
pub use skeleton::{SKELETON, SkeletonConnection};
