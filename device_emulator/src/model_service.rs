use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Model not initialized")]
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct FaceLandmarks {
    pub left_eye: [i32; 2],
    pub left_mouth: [i32; 2],
    pub nose: [i32; 2],
    pub right_eye: [i32; 2],
    pub right_mouth: [i32; 2],
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FaceDetection {
    pub score: f32,
    /// x1, y1, x2, y2
    pub bbox: [i32; 4],
    #[serde(default)]
    pub landmarks: Option<FaceLandmarks>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub predicted_class: i64,
    pub confidence: f32,
}

#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    /// Runs face detection on an encoded JPEG.
    async fn detect(&self, jpeg: &[u8]) -> Result<Vec<FaceDetection>, ModelError>;

    /// Classifies a flat row-major RGB buffer.
    async fn classify(&self, pixels: &[u8]) -> Result<Classification, ModelError>;

    fn is_ready(&self) -> bool;

    fn heap_free(&self) -> u64;
}
