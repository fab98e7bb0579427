use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Face box as reported by the device. Corners are not reordered, so
/// `x1 > x2` or `y1 > y2` can reach the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmarks {
    pub left_eye: Point,
    pub right_eye: Point,
    pub nose: Point,
    pub left_mouth: Point,
    pub right_mouth: Point,
}

impl Landmarks {
    pub fn points(&self) -> [Point; 5] {
        [
            self.left_eye,
            self.right_eye,
            self.nose,
            self.left_mouth,
            self.right_mouth,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: DetectionBox,
    pub landmarks: Option<Landmarks>,
}

/// Detections in the order the device reported them. Empty is valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub predicted_class: i64,
    pub confidence: f32,
    pub heap_free: Option<u64>,
    pub model_initialized: Option<bool>,
    /// Any other diagnostic fields the device attached.
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A decoded device response. The shape of the payload decides the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceResponse {
    /// Free-text device log with bracketed detection records.
    Log(DetectionResult),
    /// JSON list of face objects.
    JsonDetections(DetectionResult),
    JsonClassification(ClassificationResult),
}

impl DeviceResponse {
    pub fn detections(&self) -> Option<&DetectionResult> {
        match self {
            DeviceResponse::Log(result) | DeviceResponse::JsonDetections(result) => Some(result),
            DeviceResponse::JsonClassification(_) => None,
        }
    }

    pub fn classification(&self) -> Option<&ClassificationResult> {
        match self {
            DeviceResponse::JsonClassification(result) => Some(result),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeviceResponse::Log(_) => "log",
            DeviceResponse::JsonDetections(_) => "json_detections",
            DeviceResponse::JsonClassification(_) => "json_classification",
        }
    }
}
