mod json;
mod log_scanner;

pub use log_scanner::{scan, Record};

use crate::detection::{Detection, DetectionResult, DeviceResponse};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed device response: {0}")]
    MalformedResponse(String),
    #[error("Device reported failure: {0}")]
    DeviceReportedFailure(String),
}

/// Decodes a raw device response.
///
/// JSON is tried first; anything that is not JSON is read as a device log.
/// Rules for the log interpretation:
///
/// * valid UTF-8 text always decodes, an empty record set is valid data;
/// * text that looks like JSON (`{` or `[` first) but does not parse only
///   decodes if it contains at least one detection record;
/// * bytes that are not UTF-8 are scanned lossily and only decode if at least
///   one detection record is found.
#[instrument(skip(raw), fields(len = raw.len()))]
pub fn decode(raw: &[u8]) -> Result<DeviceResponse, DecodeError> {
    match std::str::from_utf8(raw) {
        Ok(text) => {
            if let Some(response) = json::decode_json(text)? {
                tracing::debug!("Decoded {} response", response.kind());
                return Ok(response);
            }

            let result = decode_log(text);
            let trimmed = text.trim_start();
            if result.is_empty() && (trimmed.starts_with('{') || trimmed.starts_with('[')) {
                return Err(DecodeError::MalformedResponse(
                    "truncated or invalid JSON document".into(),
                ));
            }
            Ok(DeviceResponse::Log(result))
        }
        Err(e) => {
            let text = String::from_utf8_lossy(raw);
            let result = decode_log(&text);
            if result.is_empty() {
                return Err(DecodeError::MalformedResponse(format!(
                    "response is not UTF-8 ({}) and holds no detection records",
                    e
                )));
            }
            tracing::warn!("Response is not valid UTF-8, decoded lossily");
            Ok(DeviceResponse::Log(result))
        }
    }
}

/// Builds a detection result from the records of a device log.
///
/// A landmark record belongs to the nearest detection record before it, as
/// long as that detection has no landmarks yet. Landmark records with no such
/// detection (at the start of the buffer, or a second landmark record in a
/// row) are dropped and logged.
pub fn decode_log(text: &str) -> DetectionResult {
    let mut detections: Vec<Detection> = Vec::new();

    for record in scan(text) {
        match record {
            Record::Detection { bbox, .. } => {
                tracing::debug!(
                    "Detection record: score={:?}, bbox=({}, {}, {}, {})",
                    bbox.score,
                    bbox.x1,
                    bbox.y1,
                    bbox.x2,
                    bbox.y2
                );
                detections.push(Detection {
                    bbox,
                    landmarks: None,
                });
            }
            Record::Landmarks { at, landmarks } => match detections.last_mut() {
                Some(detection) if detection.landmarks.is_none() => {
                    detection.landmarks = Some(landmarks);
                }
                _ => {
                    tracing::warn!("Dropping landmark record at byte {} with no detection", at);
                }
            },
        }
    }

    DetectionResult { detections }
}
