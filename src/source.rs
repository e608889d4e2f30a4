// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Decoded video assets.
//!
//! A [`VideoAsset`] exposes its duration and a sequential [`FrameReader`] over
//! its primary video track. Readers are blocking iterators; the sampler drives
//! them from a blocking thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;

use crate::error::{PoseError, Result};

/// A decoded frame and its position on the media timeline.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Presentation time.
    pub time: Duration,
    /// Decoded pixels.
    pub image: DynamicImage,
}

impl VideoFrame {
    /// Create a new frame.
    #[must_use]
    pub const fn new(time: Duration, image: DynamicImage) -> Self {
        Self { time, image }
    }
}

/// Sequential reader over an asset's frames, in non-decreasing presentation
/// time order under normal decode.
pub trait FrameReader: Iterator<Item = Result<VideoFrame>> + Send {}

impl<T> FrameReader for T where T: Iterator<Item = Result<VideoFrame>> + Send {}

/// A video that can be sampled.
pub trait VideoAsset: Send + Sync {
    /// Total duration of the asset.
    ///
    /// Fails with [`PoseError::VideoLoadFailed`] if it cannot be determined.
    fn duration(&self) -> Result<Duration>;

    /// Open a new reader positioned at the start of the primary video track.
    ///
    /// Fails with [`PoseError::VideoLoadFailed`] if the asset has no readable
    /// video track.
    fn open_reader(&self) -> Result<Box<dyn FrameReader>>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String {
        "video".to_string()
    }
}

/// An in-memory list of timed frames.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<VideoFrame>,
    duration: Duration,
}

impl FrameSequence {
    /// Create a sequence with an explicit duration.
    #[must_use]
    pub const fn new(frames: Vec<VideoFrame>, duration: Duration) -> Self {
        Self { frames, duration }
    }

    /// Blank frames at the given presentation times.
    ///
    /// The duration is the last time plus one nominal frame of `1/30` s.
    #[must_use]
    pub fn from_times(times: &[Duration], width: u32, height: u32) -> Self {
        let frames: Vec<VideoFrame> = times
            .iter()
            .map(|&t| VideoFrame::new(t, DynamicImage::new_rgb8(width, height)))
            .collect();
        let duration = times
            .iter()
            .max()
            .map_or(Duration::ZERO, |&last| last + Duration::from_secs(1) / 30);
        Self { frames, duration }
    }

    /// `count` blank frames at a constant `fps`, starting at zero.
    #[must_use]
    pub fn uniform(fps: u32, count: u32, width: u32, height: u32) -> Self {
        let fps = fps.max(1);
        // Computed per frame so that e.g. frame 3 at 30 fps lands on exactly 100 ms.
        let frames = (0..count)
            .map(|i| {
                let time = Duration::from_secs(u64::from(i)) / fps;
                VideoFrame::new(time, DynamicImage::new_rgb8(width, height))
            })
            .collect();
        Self {
            frames,
            duration: Duration::from_secs(u64::from(count)) / fps,
        }
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the sequence has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl VideoAsset for FrameSequence {
    fn duration(&self) -> Result<Duration> {
        Ok(self.duration)
    }

    fn open_reader(&self) -> Result<Box<dyn FrameReader>> {
        Ok(Box::new(self.frames.clone().into_iter().map(Ok)))
    }

    fn describe(&self) -> String {
        format!("{} in-memory frames", self.frames.len())
    }
}

/// A directory of still images played back at a fixed frame rate.
#[derive(Debug, Clone)]
pub struct ImageSequenceAsset {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    fps: f64,
}

impl ImageSequenceAsset {
    /// Collect the images in `dir`, sorted by file name.
    pub fn open<P: AsRef<Path>>(dir: P, fps: f64) -> Result<Self> {
        let dir = dir.as_ref();
        if !fps.is_finite() || fps <= 0.0 {
            return Err(PoseError::ConfigError(format!(
                "fps must be a positive number, got {fps}"
            )));
        }
        if !dir.is_dir() {
            return Err(PoseError::VideoLoadFailed(format!(
                "Not a directory: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| PoseError::VideoLoadFailed(format!("{}: {e}", dir.display())))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_image_file(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(PoseError::VideoLoadFailed(format!(
                "No images found in {}",
                dir.display()
            )));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            paths,
            fps,
        })
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Always `false`; opening fails on an empty directory.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl VideoAsset for ImageSequenceAsset {
    fn duration(&self) -> Result<Duration> {
        Ok(frame_time(self.paths.len(), self.fps))
    }

    fn open_reader(&self) -> Result<Box<dyn FrameReader>> {
        let fps = self.fps;
        let paths = self.paths.clone();
        let reader = paths.into_iter().enumerate().map(move |(idx, path)| {
            let time = frame_time(idx, fps);
            image::open(&path)
                .map(|image| VideoFrame::new(time, image))
                .map_err(|e| PoseError::ImageError(format!("Failed to load {}: {e}", path.display())))
        });
        Ok(Box::new(reader))
    }

    fn describe(&self) -> String {
        format!("{} ({} images @ {} fps)", self.dir.display(), self.paths.len(), self.fps)
    }
}

/// Presentation time of frame `idx` at a constant `fps`, rounded to the nanosecond.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn frame_time(idx: usize, fps: f64) -> Duration {
    Duration::from_nanos((idx as f64 * 1e9 / fps).round() as u64)
}

/// Check if a path is an image file based on extension.
fn is_image_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        let ext = ext.to_string_lossy().to_lowercase();
        matches!(
            ext.as_str(),
            "jpg" | "jpeg" | "png" | "bmp" | "gif" | "webp" | "tiff" | "tif"
        )
    })
}

/// Check if a path is a video file based on extension.
fn is_video_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        let ext = ext.to_string_lossy().to_lowercase();
        matches!(
            ext.as_str(),
            "mp4" | "avi" | "mov" | "mkv" | "wmv" | "flv" | "webm" | "m4v" | "mpeg" | "mpg"
        )
    })
}

/// Open a video file or an image directory.
///
/// `fps` only applies to image directories.
pub fn open_asset<P: AsRef<Path>>(path: P, fps: f64) -> Result<Arc<dyn VideoAsset>> {
    let path = path.as_ref();

    if path.is_dir() {
        return Ok(Arc::new(ImageSequenceAsset::open(path, fps)?));
    }

    if is_video_file(path) {
        #[cfg(feature = "video")]
        {
            return Ok(Arc::new(video::VideoFileAsset::open(path)?));
        }
        #[cfg(not(feature = "video"))]
        {
            return Err(PoseError::FeatureNotEnabled(
                "Video support requires 'video' feature".to_string(),
            ));
        }
    }

    Err(PoseError::VideoLoadFailed(format!(
        "Unsupported source: {}",
        path.display()
    )))
}

#[cfg(feature = "video")]
pub use video::VideoFileAsset;

#[cfg(feature = "video")]
mod video {
    use std::path::{Path, PathBuf};
    use std::sync::{OnceLock, mpsc};
    use std::time::Duration;

    use image::DynamicImage;
    use video_rs::decode::Decoder;

    use super::{FrameReader, VideoAsset, VideoFrame};
    use crate::error::{PoseError, Result};

    static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

    fn ensure_init() -> Result<()> {
        INIT.get_or_init(|| video_rs::init().map_err(|e| e.to_string()))
            .clone()
            .map_err(|e| PoseError::VideoLoadFailed(format!("Failed to initialize FFmpeg: {e}")))
    }

    /// A video file decoded with FFmpeg through `video-rs`.
    #[derive(Debug, Clone)]
    pub struct VideoFileAsset {
        path: PathBuf,
        duration: Duration,
    }

    impl VideoFileAsset {
        /// Probe the file for a video track and its duration.
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            ensure_init()?;
            let path = path.as_ref().to_path_buf();
            let decoder = Self::decoder(&path)?;
            let seconds = decoder
                .duration()
                .map_err(|e| PoseError::VideoLoadFailed(format!("Failed to read duration: {e}")))?
                .as_secs_f64();
            Ok(Self {
                path,
                duration: Duration::from_secs_f64(seconds.max(0.0)),
            })
        }

        fn decoder(path: &Path) -> Result<Decoder> {
            Decoder::new(path).map_err(|e| {
                PoseError::VideoLoadFailed(format!(
                    "Failed to create decoder for {}: {e}",
                    path.display()
                ))
            })
        }
    }

    impl VideoAsset for VideoFileAsset {
        fn duration(&self) -> Result<Duration> {
            Ok(self.duration)
        }

        fn open_reader(&self) -> Result<Box<dyn FrameReader>> {
            let path = self.path.clone();
            let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
            let (sender, receiver) = mpsc::sync_channel(FRAME_QUEUE);

            // The decoder is created and driven on its own producer thread.
            std::thread::spawn(move || {
                let mut decoder = match Self::decoder(&path) {
                    Ok(decoder) => {
                        let _ = ready_tx.send(Ok(()));
                        decoder
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while let Some(item) = next_frame(&mut decoder) {
                    if sender.send(item).is_err() {
                        break;
                    }
                }
            });

            match ready_rx.recv() {
                Ok(Ok(())) => Ok(Box::new(VideoFileReader { receiver })),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(PoseError::VideoLoadFailed(format!(
                    "Decoder thread exited for {}",
                    self.path.display()
                ))),
            }
        }

        fn describe(&self) -> String {
            self.path.display().to_string()
        }
    }

    /// Frames decoded ahead of the reader.
    const FRAME_QUEUE: usize = 2;

    struct VideoFileReader {
        receiver: mpsc::Receiver<Result<VideoFrame>>,
    }

    impl Iterator for VideoFileReader {
        type Item = Result<VideoFrame>;

        fn next(&mut self) -> Option<Self::Item> {
            self.receiver.recv().ok()
        }
    }

    fn next_frame(decoder: &mut Decoder) -> Option<Result<VideoFrame>> {
        match decoder.decode() {
            Ok((ts, frame)) => {
                let time = Duration::from_secs_f64(ts.as_secs_f64().max(0.0));
                Some(video_frame_to_image(&frame).map(|image| VideoFrame::new(time, image)))
            }
            Err(video_rs::Error::DecodeExhausted) => None,
            Err(e) => Some(Err(PoseError::VideoError(format!("Decode failed: {e}")))),
        }
    }

    /// Convert a `video_rs` HWC RGB frame to `DynamicImage`.
    fn video_frame_to_image(arr: &video_rs::Frame) -> Result<DynamicImage> {
        let shape = arr.shape();
        let height = u32::try_from(shape[0])
            .map_err(|_| PoseError::ImageError("Image height exceeds u32::MAX".to_string()))?;
        let width = u32::try_from(shape[1])
            .map_err(|_| PoseError::ImageError("Image width exceeds u32::MAX".to_string()))?;

        let rgb_data: Vec<u8> = arr.iter().copied().collect();
        let img_buffer = image::RgbImage::from_raw(width, height, rgb_data).ok_or_else(|| {
            PoseError::ImageError("Failed to create image from video frame".to_string())
        })?;

        Ok(DynamicImage::ImageRgb8(img_buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sequence_times() {
        let seq = FrameSequence::uniform(30, 90, 4, 4);
        assert_eq!(seq.len(), 90);
        assert_eq!(seq.duration().unwrap(), Duration::from_secs(3));

        let times: Vec<Duration> = seq
            .open_reader()
            .unwrap()
            .map(|f| f.unwrap().time)
            .take(4)
            .collect();
        assert_eq!(times[0], Duration::ZERO);
        assert_eq!(times[1], Duration::from_secs(1) / 30);
        assert_eq!(times[2], Duration::from_secs(2) / 30);
        assert_eq!(times[3], Duration::from_millis(100));
    }

    #[test]
    fn test_reader_can_be_reopened() {
        let seq = FrameSequence::from_times(&[Duration::from_millis(500)], 2, 2);
        assert_eq!(seq.open_reader().unwrap().count(), 1);
        assert_eq!(seq.open_reader().unwrap().count(), 1);
    }

    #[test]
    fn test_image_sequence_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.png", "notes.txt"] {
            let path = dir.path().join(name);
            if name.ends_with(".png") {
                DynamicImage::new_rgb8(8, 6).save(&path).unwrap();
            } else {
                std::fs::write(&path, "skip me").unwrap();
            }
        }

        let asset = ImageSequenceAsset::open(dir.path(), 4.0).unwrap();
        assert_eq!(asset.len(), 2);
        assert_eq!(asset.duration().unwrap(), Duration::from_millis(500));

        let frames: Vec<VideoFrame> = asset.open_reader().unwrap().map(|f| f.unwrap()).collect();
        assert_eq!(frames[1].time, Duration::from_millis(250));
        assert_eq!(frames[0].image.width(), 8);
    }

    #[test]
    fn test_corrupt_image_is_a_frame_level_item() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            let path = dir.path().join(format!("f{i:03}.png"));
            if i == 1 {
                std::fs::write(&path, b"not a png").unwrap();
            } else {
                DynamicImage::new_rgb8(2, 2).save(&path).unwrap();
            }
        }

        let asset = ImageSequenceAsset::open(dir.path(), 10.0).unwrap();
        let items: Vec<Result<VideoFrame>> = asset.open_reader().unwrap().collect();
        assert_eq!(items.len(), 4);
        assert!(items[1].as_ref().is_err_and(PoseError::is_frame_level));
        assert_eq!(items[3].as_ref().unwrap().time, Duration::from_millis(300));
    }

    #[test]
    fn test_frame_time_is_exact_for_decimal_rates() {
        assert_eq!(frame_time(3, 10.0), Duration::from_millis(300));
        assert_eq!(frame_time(7, 10.0), Duration::from_millis(700));
        assert_eq!(frame_time(1, 3.0), Duration::from_nanos(333_333_333));
    }

    #[test]
    fn test_image_sequence_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceAsset::open(dir.path(), 10.0),
            Err(PoseError::VideoLoadFailed(_))
        ));
        assert!(matches!(
            ImageSequenceAsset::open(dir.path().join("missing"), 10.0),
            Err(PoseError::VideoLoadFailed(_))
        ));
        assert!(matches!(
            ImageSequenceAsset::open(dir.path(), 0.0),
            Err(PoseError::ConfigError(_))
        ));
    }

    #[test]
    fn test_open_asset_rejects_unknown_files() {
        assert!(matches!(
            open_asset("notes.txt", 10.0),
            Err(PoseError::VideoLoadFailed(_))
        ));
    }

    #[cfg(not(feature = "video"))]
    #[test]
    fn test_open_asset_video_needs_feature() {
        assert!(matches!(
            open_asset("clip.mp4", 10.0),
            Err(PoseError::FeatureNotEnabled(_))
        ));
    }
}
