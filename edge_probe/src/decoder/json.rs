use super::DecodeError;
use crate::detection::{
    ClassificationResult, Detection, DetectionBox, DetectionResult, DeviceResponse, Landmarks,
    Point,
};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonShape {
    Faces(Vec<JsonFace>),
    Classification(JsonClassification),
}

#[derive(Debug, Deserialize)]
struct JsonFace {
    #[serde(rename = "box")]
    bbox: [i32; 4],
    #[serde(default)]
    score: Option<f32>,
    #[serde(default, alias = "keypoints")]
    landmarks: Option<JsonLandmarks>,
}

/// Landmarks either as five `[x, y]` pairs in
/// left_eye, right_eye, nose, left_mouth, right_mouth order, or by name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonLandmarks {
    Ordered([[i32; 2]; 5]),
    Named {
        left_eye: [i32; 2],
        right_eye: [i32; 2],
        nose: [i32; 2],
        left_mouth: [i32; 2],
        right_mouth: [i32; 2],
    },
}

impl From<JsonLandmarks> for Landmarks {
    fn from(value: JsonLandmarks) -> Self {
        let point = |[x, y]: [i32; 2]| Point::new(x, y);
        match value {
            JsonLandmarks::Ordered([le, re, n, lm, rm]) => Landmarks {
                left_eye: point(le),
                right_eye: point(re),
                nose: point(n),
                left_mouth: point(lm),
                right_mouth: point(rm),
            },
            JsonLandmarks::Named {
                left_eye,
                right_eye,
                nose,
                left_mouth,
                right_mouth,
            } => Landmarks {
                left_eye: point(left_eye),
                right_eye: point(right_eye),
                nose: point(nose),
                left_mouth: point(left_mouth),
                right_mouth: point(right_mouth),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonClassification {
    success: bool,
    #[serde(default)]
    predicted_class: Option<i64>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    heap_free: Option<u64>,
    #[serde(default)]
    model_initialized: Option<bool>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl JsonClassification {
    fn into_result(self) -> Result<ClassificationResult, DecodeError> {
        if !self.success {
            let message = self
                .error_message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "device reported failure without a message".to_string());
            return Err(DecodeError::DeviceReportedFailure(message));
        }

        let predicted_class = self.predicted_class.ok_or_else(|| {
            DecodeError::MalformedResponse("classification is missing `predicted_class`".into())
        })?;
        let confidence = self.confidence.ok_or_else(|| {
            DecodeError::MalformedResponse("classification is missing `confidence`".into())
        })?;

        Ok(ClassificationResult {
            predicted_class,
            confidence,
            heap_free: self.heap_free,
            model_initialized: self.model_initialized,
            extra: self.extra,
        })
    }
}

/// Decodes a JSON document into one of the structured response shapes.
///
/// `Ok(None)` means the bytes are not JSON at all, so the caller may try
/// other interpretations.
pub(super) fn decode_json(text: &str) -> Result<Option<DeviceResponse>, DecodeError> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };

    let shape = JsonShape::deserialize(value).map_err(|_| {
        DecodeError::MalformedResponse(
            "JSON is neither a face list nor a classification result".into(),
        )
    })?;

    match shape {
        JsonShape::Faces(faces) => {
            let detections = faces
                .into_iter()
                .map(|face| {
                    let [x1, y1, x2, y2] = face.bbox;
                    Detection {
                        bbox: DetectionBox {
                            x1,
                            y1,
                            x2,
                            y2,
                            score: face.score,
                        },
                        landmarks: face.landmarks.map(Landmarks::from),
                    }
                })
                .collect();
            Ok(Some(DeviceResponse::JsonDetections(DetectionResult {
                detections,
            })))
        }
        JsonShape::Classification(classification) => classification
            .into_result()
            .map(|result| Some(DeviceResponse::JsonClassification(result))),
    }
}
