//! Object detection and the "is the target class present?" decision.
//!
//! A [`Detector`] turns an image into a [`DetectionResult`]; [`classify`]
//! reduces that to a [`Decision`] by plain set membership.

pub mod nms;
pub mod preprocess;
pub mod yolo;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::consts::{
    DEFAULT_AGNOSTIC_NMS, DEFAULT_CONF_THRESHOLD, DEFAULT_INPUT_SIZE, DEFAULT_IOU_THRESHOLD,
    DEFAULT_MAX_DETECTIONS,
};

/// One predicted box.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub score: f32,
    /// `[x1, y1, x2, y2]` in original image pixels.
    pub bbox: [f32; 4],
}

/// Detections for one image, highest score first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Class ids in detection order, duplicates kept.
    pub fn class_ids(&self) -> Vec<u32> {
        self.detections.iter().map(|d| d.class_id).collect()
    }

    pub fn distinct_classes(&self) -> BTreeSet<u32> {
        self.detections.iter().map(|d| d.class_id).collect()
    }
}

impl From<Vec<Detection>> for DetectionResult {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

/// Thresholds applied after inference. Fixed per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    /// Suppress overlapping boxes across classes, not just within one.
    pub agnostic_nms: bool,
    pub max_detections: usize,
    /// Square side the image is letterboxed to.
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            agnostic_nms: DEFAULT_AGNOSTIC_NMS,
            max_detections: DEFAULT_MAX_DETECTIONS,
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

/// Anything that can find objects in an image file.
pub trait Detector {
    fn detect(&self, image: &Path) -> Result<DetectionResult>;
}

/// Outcome of the membership test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    TargetPresent,
    TargetAbsent,
}

impl Decision {
    /// `0` when the target was seen, `1` otherwise.
    pub fn code(self) -> u8 {
        match self {
            Decision::TargetPresent => 0,
            Decision::TargetAbsent => 1,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Presence of `target_class` wins regardless of score or other classes.
pub fn classify(result: &DetectionResult, target_class: u32) -> Decision {
    if result.distinct_classes().contains(&target_class) {
        Decision::TargetPresent
    } else {
        Decision::TargetAbsent
    }
}

/// A decision together with the classes it was made from.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub decision: Decision,
    pub classes: Vec<u32>,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.decision)?;
        write!(f, "Detected Classes: {:?}", self.classes)
    }
}

/// Run `detector` once over `image` and decide on `target_class`.
pub fn classify_image(
    detector: &dyn Detector,
    image: &Path,
    target_class: u32,
) -> Result<Classification> {
    let result = detector.detect(image)?;
    Ok(Classification {
        decision: classify(&result, target_class),
        classes: result.class_ids(),
    })
}
