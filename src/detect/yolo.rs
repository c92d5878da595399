//! YOLO detector backed by ONNX Runtime.
//!
//! Expects a single-output export in the Ultralytics layout: one row per
//! feature (`cx, cy, w, h`, then one score per class) and one column per
//! anchor. Transposed exports are accepted too; the anchor axis is the one
//! whose length matches the anchor grid for the configured input size.

use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use image::DynamicImage;
use ndarray::{Array4, ArrayViewD, Axis, Ix2};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Value;
use tracing::{debug, info};

use super::nms::non_max_suppression;
use super::preprocess::{Letterbox, letterbox};
use super::{Detection, DetectionResult, Detector, DetectorConfig};

/// Number of box coordinates ahead of the class scores.
const BOX_FEATURES: usize = 4;

/// Detection head strides of a YOLOv8 model.
const STRIDES: [u32; 3] = [8, 16, 32];

/// Anchors produced for a square input: one per grid cell at each stride.
pub fn expected_anchors(input_size: u32) -> usize {
    STRIDES
        .iter()
        .map(|stride| ((input_size / stride) as usize).pow(2))
        .sum()
}

pub struct YoloDetector {
    /// `Session::run` needs `&mut`; the session is otherwise never changed.
    session: Mutex<Session>,
    input_name: String,
    config: DetectorConfig,
}

impl fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YoloDetector")
            .field("input_name", &self.input_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl YoloDetector {
    /// Load an ONNX model once. The returned detector is reused for every
    /// image.
    pub fn load<P: AsRef<Path>>(model_path: P, config: DetectorConfig) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            bail!("detection model not found: {}", model_path.display());
        }

        info!("loading detection model from {}", model_path.display());

        let session = Session::builder()
            .context("failed to create session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to set optimization level")?
            .with_intra_threads(4)
            .context("failed to set intra threads")?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load detection model from {}", model_path.display())
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        debug!(input = %input_name, ?config, "detection model loaded");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            config,
        })
    }

    /// Detect on an already decoded image.
    pub fn detect_image(&self, image: &DynamicImage) -> Result<DetectionResult> {
        let (input, fit) = letterbox(image, self.config.input_size);
        let candidates = self.infer(input, &fit)?;
        let candidate_count = candidates.len();

        let detections = non_max_suppression(
            candidates,
            self.config.iou_threshold,
            self.config.agnostic_nms,
            self.config.max_detections,
        );

        debug!(
            candidates = candidate_count,
            kept = detections.len(),
            "detection finished"
        );
        Ok(DetectionResult::new(detections))
    }

    fn infer(&self, input: Array4<f32>, fit: &Letterbox) -> Result<Vec<Detection>> {
        let input_value = Value::from_array(input).context("failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("detection session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("detection inference failed")?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("failed to extract output tensor")?;

        decode_predictions(
            output,
            self.config.conf_threshold,
            self.config.input_size,
            fit,
        )
    }
}

impl Detector for YoloDetector {
    fn detect(&self, image: &Path) -> Result<DetectionResult> {
        let decoded = image::open(image)
            .with_context(|| format!("failed to open image {}", image.display()))?;
        self.detect_image(&decoded)
    }
}

/// Turn raw YOLO output into candidate boxes in image coordinates.
///
/// Each anchor takes its best class. Anchors whose best score does not
/// exceed `conf_threshold` are dropped. No suppression happens here.
///
/// `input_size` fixes the anchor count, which decides the layout. An output
/// with no axis of that length is rejected.
pub fn decode_predictions(
    output: ArrayViewD<'_, f32>,
    conf_threshold: f32,
    input_size: u32,
    fit: &Letterbox,
) -> Result<Vec<Detection>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
        bail!(
            "unexpected detection output shape {:?}, expected [1, 4 + classes, anchors]",
            shape
        );
    }

    let preds = output
        .index_axis_move(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .context("detection output is not two-dimensional")?;

    let anchors = expected_anchors(input_size);
    let preds = if preds.ncols() == anchors {
        preds
    } else if preds.nrows() == anchors {
        preds.reversed_axes()
    } else {
        bail!(
            "detection output shape {:?} has no axis of {} anchors for input size {}",
            shape,
            anchors,
            input_size
        );
    };

    if preds.nrows() <= BOX_FEATURES {
        bail!(
            "detection output has {} features, need box coordinates plus at least one class",
            preds.nrows()
        );
    }

    let mut candidates = Vec::new();
    for anchor in preds.columns() {
        let (class_id, score) = anchor
            .iter()
            .skip(BOX_FEATURES)
            .enumerate()
            .fold((0usize, f32::MIN), |best, (i, &s)| {
                if s > best.1 { (i, s) } else { best }
            });

        if score <= conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
        let bbox = fit.to_image([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);

        candidates.push(Detection {
            class_id: class_id as u32,
            score,
            bbox,
        });
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, IxDyn};

    /// Smallest input with a full anchor grid: 16 + 4 + 1 anchors.
    const SMALL_INPUT: u32 = 32;

    fn small_fit() -> Letterbox {
        Letterbox::fit(SMALL_INPUT, SMALL_INPUT, SMALL_INPUT)
    }

    /// Build a `[1, 7, 21]` tensor whose leading anchors are the given rows.
    fn output_from(anchors: &[[f32; 7]]) -> Array3<f32> {
        let mut out = Array3::<f32>::zeros((1, 7, expected_anchors(SMALL_INPUT)));
        for (i, row) in anchors.iter().enumerate() {
            for (f, &v) in row.iter().enumerate() {
                out[[0, f, i]] = v;
            }
        }
        out
    }

    #[test]
    fn anchor_counts_follow_strides() {
        assert_eq!(expected_anchors(640), 8400);
        assert_eq!(expected_anchors(320), 2100);
        assert_eq!(expected_anchors(32), 21);
    }

    #[test]
    fn decode_picks_best_class_per_anchor() {
        let out = output_from(&[[16.0, 16.0, 8.0, 8.0, 0.1, 0.8, 0.3]]);
        let dets =
            decode_predictions(out.view().into_dyn(), 0.25, SMALL_INPUT, &small_fit()).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert_eq!(dets[0].score, 0.8);
        assert_eq!(dets[0].bbox, [12.0, 12.0, 20.0, 20.0]);
    }

    #[test]
    fn decode_drops_low_confidence() {
        let out = output_from(&[
            [8.0, 8.0, 4.0, 4.0, 0.1, 0.2, 0.25],
            [24.0, 24.0, 4.0, 4.0, 0.9, 0.0, 0.0],
        ]);
        let dets =
            decode_predictions(out.view().into_dyn(), 0.25, SMALL_INPUT, &small_fit()).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 0);
    }

    #[test]
    fn decode_keeps_anchor_axis_when_classes_outnumber_anchors() {
        // 80 classes at a 32px input: 84 features but only 21 anchors
        let mut out = Array3::<f32>::zeros((1, 84, 21));
        out[[0, 0, 0]] = 16.0;
        out[[0, 1, 0]] = 16.0;
        out[[0, 2, 0]] = 8.0;
        out[[0, 3, 0]] = 8.0;
        out[[0, BOX_FEATURES + 5, 0]] = 0.9;

        let dets =
            decode_predictions(out.view().into_dyn(), 0.25, SMALL_INPUT, &small_fit()).unwrap();
        let found: Vec<(u32, f32)> = dets.iter().map(|d| (d.class_id, d.score)).collect();
        assert_eq!(found, vec![(5, 0.9)]);
        assert_eq!(dets[0].bbox, [12.0, 12.0, 20.0, 20.0]);
    }

    #[test]
    fn decode_accepts_transposed_layout() {
        // 21 anchors x 7 features
        let mut out = Array3::<f32>::zeros((1, 21, 7));
        out[[0, 4, 0]] = 10.0;
        out[[0, 4, 1]] = 10.0;
        out[[0, 4, 2]] = 4.0;
        out[[0, 4, 3]] = 4.0;
        out[[0, 4, 6]] = 0.9;
        let dets =
            decode_predictions(out.view().into_dyn(), 0.25, SMALL_INPUT, &small_fit()).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 2);
        assert_eq!(dets[0].bbox, [8.0, 8.0, 12.0, 12.0]);
    }

    #[test]
    fn decode_rejects_unknown_anchor_count() {
        let out = Array3::<f32>::zeros((1, 84, 100));
        let err =
            decode_predictions(out.view().into_dyn(), 0.25, 640, &Letterbox::fit(640, 640, 640))
                .unwrap_err();
        assert!(err.to_string().contains("8400 anchors"));
    }

    #[test]
    fn decode_maps_back_through_letterbox() {
        let fit = Letterbox::fit(1280, 640, 640);
        let mut out = Array3::<f32>::zeros((1, 7, 8400));
        for (f, v) in [150.0, 310.0, 100.0, 100.0, 0.0, 0.0, 0.9].into_iter().enumerate() {
            out[[0, f, 0]] = v;
        }
        let dets = decode_predictions(out.view().into_dyn(), 0.25, 640, &fit).unwrap();
        assert_eq!(dets[0].bbox, [200.0, 200.0, 400.0, 400.0]);
    }

    #[test]
    fn decode_rejects_wrong_rank() {
        let out = ndarray::ArrayD::<f32>::zeros(IxDyn(&[84, 8400]));
        assert!(decode_predictions(out.view(), 0.25, 640, &small_fit()).is_err());
    }

    #[test]
    fn decode_rejects_batch_above_one() {
        let out = ndarray::ArrayD::<f32>::zeros(IxDyn(&[2, 84, 8400]));
        assert!(decode_predictions(out.view(), 0.25, 640, &small_fit()).is_err());
    }

    #[test]
    fn decode_rejects_missing_class_scores() {
        let out = ndarray::ArrayD::<f32>::zeros(IxDyn(&[1, 4, 8400]));
        let err = decode_predictions(out.view(), 0.25, 640, &small_fit()).unwrap_err();
        assert!(err.to_string().contains("features"));
    }

    #[test]
    fn decode_empty_when_nothing_confident() {
        let out = Array3::<f32>::zeros((1, 84, 8400));
        let dets = decode_predictions(out.view().into_dyn(), 0.25, 640, &small_fit()).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn load_missing_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.onnx");
        let err = YoloDetector::load(&path, DetectorConfig::default()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
