// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLO pose backend on ONNX Runtime.
//!
//! Expects a single-class pose export with output `[1, 56, N]` (or its
//! transpose): box `cx, cy, w, h`, the person score, then 17 COCO keypoints as
//! `x, y, conf` in letterboxed input pixels. Only the highest-scoring person
//! is returned. Neck and root are synthesized from the shoulder and hip
//! midpoints.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use crate::config::ProcessorConfig;
use crate::detector::{PoseDetector, check_frame};
use crate::error::{PoseError, Result};
use crate::keypoint::{Joint, Keypoint, Pose};
use crate::verbose;

/// COCO keypoints per person.
const NUM_KEYPOINTS: usize = 17;
/// Box (4) plus person score (1).
const KPT_OFFSET: usize = 5;
/// Features per prediction.
const POSE_FEATURES: usize = KPT_OFFSET + NUM_KEYPOINTS * 3;
/// Input size used when the model carries no `imgsz` metadata.
const DEFAULT_IMGSZ: (u32, u32) = (640, 640);
/// Letterbox padding value (114 / 255).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// How a frame was fitted into the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Uniform scale from frame pixels to input pixels.
    pub scale: f32,
    /// Left padding in input pixels.
    pub pad_x: f32,
    /// Top padding in input pixels.
    pub pad_y: f32,
    /// Original frame width.
    pub width: u32,
    /// Original frame height.
    pub height: u32,
}

impl Letterbox {
    /// Fit a `width` x `height` frame into `target` (width, height), centred.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(width: u32, height: u32, target: (u32, u32)) -> Self {
        let (tw, th) = (target.0 as f32, target.1 as f32);
        let scale = (tw / width as f32).min(th / height as f32);
        let (new_w, new_h) = Self::scaled(width, height, scale);
        Self {
            scale,
            pad_x: (target.0.saturating_sub(new_w) / 2) as f32,
            pad_y: (target.1.saturating_sub(new_h) / 2) as f32,
            width,
            height,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn scaled(width: u32, height: u32, scale: f32) -> (u32, u32) {
        (
            ((width as f32 * scale).round() as u32).max(1),
            ((height as f32 * scale).round() as u32).max(1),
        )
    }

    /// Map a point in input pixels to normalized frame coordinates with the
    /// origin at the bottom-left.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn normalize(&self, x: f32, y: f32) -> (f32, f32) {
        let fx = (x - self.pad_x) / self.scale;
        let fy = (y - self.pad_y) / self.scale;
        (
            (fx / self.width as f32).clamp(0.0, 1.0),
            (1.0 - fy / self.height as f32).clamp(0.0, 1.0),
        )
    }
}

/// Letterbox `frame` into an NCHW tensor of `target` (width, height).
#[must_use]
pub fn preprocess(frame: &DynamicImage, target: (u32, u32)) -> (Array4<f32>, Letterbox) {
    let (width, height) = frame.dimensions();
    let letterbox = Letterbox::fit(width, height, target);
    let (new_w, new_h) = Letterbox::scaled(width, height, letterbox.scale);
    let resized: RgbImage = image::imageops::resize(&frame.to_rgb8(), new_w, new_h, FilterType::Triangle);

    let (tw, th) = (target.0 as usize, target.1 as usize);
    let mut tensor = Array4::from_elem((1, 3, th, tw), PAD_VALUE);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (ox, oy) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (ox + x as usize, oy + y as usize);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = f32::from(pixel[c]) / 255.0;
        }
    }
    (tensor, letterbox)
}

/// One decoded person: score and COCO keypoints in input pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPerson {
    /// Person score.
    pub score: f32,
    /// `[x, y, conf]` per COCO keypoint.
    pub keypoints: [[f32; 3]; NUM_KEYPOINTS],
}

/// Highest-scoring person at or above `threshold` in a pose model output.
#[must_use]
pub fn best_person(output: &[f32], shape: &[usize], threshold: f32) -> Option<RawPerson> {
    let (num_preds, transposed) = match shape {
        [_, a, b] | [a, b] if *a == POSE_FEATURES => (*b, false),
        [_, a, b] | [a, b] if *b == POSE_FEATURES => (*a, true),
        _ => return None,
    };
    if num_preds == 0 || output.len() < num_preds * POSE_FEATURES {
        return None;
    }

    let at = |pred: usize, feature: usize| {
        if transposed {
            output[pred * POSE_FEATURES + feature]
        } else {
            output[feature * num_preds + pred]
        }
    };

    let best = (0..num_preds)
        .map(|i| (i, at(i, 4)))
        .filter(|(_, score)| !score.is_nan() && *score >= threshold)
        .max_by(|(_, a), (_, b)| a.total_cmp(b))?;

    let mut keypoints = [[0.0; 3]; NUM_KEYPOINTS];
    for (k, kpt) in keypoints.iter_mut().enumerate() {
        let offset = KPT_OFFSET + k * 3;
        *kpt = [at(best.0, offset), at(best.0, offset + 1), at(best.0, offset + 2)];
    }
    Some(RawPerson {
        score: best.1,
        keypoints,
    })
}

/// Convert a decoded person into a [`Pose`] in normalized frame coordinates.
#[must_use]
pub fn to_pose(person: &RawPerson, letterbox: &Letterbox) -> Pose {
    let mut points: Vec<Keypoint> = person
        .keypoints
        .iter()
        .enumerate()
        .filter_map(|(i, &[x, y, conf])| {
            let joint = Joint::from_coco_index(i)?;
            let (nx, ny) = letterbox.normalize(x, y);
            Some(Keypoint::new(joint, nx, ny, conf.clamp(0.0, 1.0)))
        })
        .collect();

    let midpoint = |a: usize, b: usize, joint: Joint| {
        let (pa, pb) = (&points[a], &points[b]);
        Keypoint::new(
            joint,
            (pa.x() + pb.x()) / 2.0,
            (pa.y() + pb.y()) / 2.0,
            pa.confidence().min(pb.confidence()),
        )
    };
    // COCO indices 5/6 are the shoulders, 11/12 the hips.
    let neck = midpoint(5, 6, Joint::Neck);
    let root = midpoint(11, 12, Joint::Root);
    points.push(neck);
    points.push(root);

    Pose::new(points)
}

/// Parse an `imgsz` metadata value such as `[640, 640]` into (width, height).
#[must_use]
pub fn parse_imgsz(value: &str) -> Option<(u32, u32)> {
    let dims: Vec<u32> = value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|v| v.trim().parse().ok())
        .collect::<Option<_>>()?;
    match dims.as_slice() {
        [s] => Some((*s, *s)),
        [h, w] => Some((*w, *h)),
        _ => None,
    }
}

/// [`PoseDetector`] running a YOLO pose model.
pub struct OnnxPoseDetector {
    session: Arc<Mutex<Session>>,
    input_name: String,
    output_name: String,
    imgsz: (u32, u32),
    confidence: f32,
    model_path: String,
}

impl OnnxPoseDetector {
    /// Load a pose model.
    ///
    /// Fails with [`PoseError::ModelLoadFailed`] if the file is missing or
    /// cannot be loaded by ONNX Runtime.
    pub fn load<P: AsRef<Path>>(path: P, config: &ProcessorConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PoseError::ModelLoadFailed(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        #[allow(unused_mut)]
        let mut builder = Session::builder()
            .map_err(|e| PoseError::ModelLoadFailed(format!("Failed to create session builder: {e}")))?;

        #[cfg(feature = "coreml")]
        {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CoreMLExecutionProvider::default().build()
                ])
                .map_err(|e| PoseError::ModelLoadFailed(format!("Failed to register CoreML EP: {e}")))?;
        }

        #[cfg(feature = "cuda")]
        {
            builder = builder
                .with_execution_providers([ort::execution_providers::CUDAExecutionProvider::default().build()])
                .map_err(|e| PoseError::ModelLoadFailed(format!("Failed to register CUDA EP: {e}")))?;
        }

        let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let session = builder
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| PoseError::ModelLoadFailed(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(threads)
            .map_err(|e| PoseError::ModelLoadFailed(format!("Failed to set intra-thread count: {e}")))?
            .commit_from_file(path)
            .map_err(|e| PoseError::ModelLoadFailed(format!("Failed to load model: {e}")))?;

        let imgsz = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("imgsz").ok().flatten())
            .and_then(|v| parse_imgsz(&v))
            .unwrap_or(DEFAULT_IMGSZ);
        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "images".to_string(), |i| i.name.clone());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| PoseError::ModelLoadFailed("Model has no outputs".to_string()))?;

        verbose!("Loaded pose model {} ({}x{})", path.display(), imgsz.0, imgsz.1);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
            imgsz,
            confidence: config.confidence_threshold,
            model_path: path.display().to_string(),
        })
    }

    /// Model input size as (width, height).
    #[must_use]
    pub const fn imgsz(&self) -> (u32, u32) {
        self.imgsz
    }

    fn run(
        session: &Mutex<Session>,
        input_name: &str,
        output_name: &str,
        input: &Array4<f32>,
    ) -> Result<(Vec<f32>, Vec<usize>)> {
        let input = input.as_standard_layout();
        let tensor = TensorRef::from_array_view(&input)
            .map_err(|e| PoseError::FrameProcessingFailed(format!("Failed to create input tensor: {e}")))?;

        let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session
            .run(ort::inputs![input_name => tensor])
            .map_err(|e| PoseError::FrameProcessingFailed(format!("Inference failed: {e}")))?;
        let output = outputs
            .get(output_name)
            .ok_or_else(|| PoseError::FrameProcessingFailed(format!("Output '{output_name}' not found")))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PoseError::FrameProcessingFailed(format!("Failed to extract output: {e}")))?;

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        Ok((data.to_vec(), shape))
    }
}

#[async_trait]
impl PoseDetector for OnnxPoseDetector {
    async fn detect_pose(&self, frame: &DynamicImage) -> Result<Option<Pose>> {
        check_frame(frame)?;
        let (input, letterbox) = preprocess(frame, self.imgsz);

        let session = Arc::clone(&self.session);
        let (input_name, output_name) = (self.input_name.clone(), self.output_name.clone());
        let (output, shape) = tokio::task::spawn_blocking(move || {
            Self::run(&session, &input_name, &output_name, &input)
        })
        .await
        .map_err(|e| PoseError::FrameProcessingFailed(format!("Inference task failed: {e}")))??;

        Ok(best_person(&output, &shape, self.confidence).map(|person| to_pose(&person, &letterbox)))
    }
}

impl std::fmt::Debug for OnnxPoseDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPoseDetector")
            .field("model", &self.model_path)
            .field("imgsz", &self.imgsz)
            .field("confidence", &self.confidence)
            .finish_non_exhaustive()
    }
}
