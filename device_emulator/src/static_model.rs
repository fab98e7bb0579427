use crate::config::ModelConfig;
use crate::model_service::{Classification, FaceDetection, ModelError, ModelService};
use async_trait::async_trait;

/// Answers every request with the configured detections and class.
///
/// Inputs are still validated the way the firmware does: the JPEG must
/// decode and the pixel buffer must have the expected length.
#[derive(Debug, Clone)]
pub struct StaticModelService {
    config: ModelConfig,
}

impl StaticModelService {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl ModelService for StaticModelService {
    async fn detect(&self, jpeg: &[u8]) -> Result<Vec<FaceDetection>, ModelError> {
        if !self.config.ready {
            return Err(ModelError::NotReady);
        }
        let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
            .map_err(|e| ModelError::InvalidImage(e.to_string()))?;
        tracing::debug!("Decoded {}x{} frame", img.width(), img.height());

        Ok(self.config.faces.clone())
    }

    async fn classify(&self, pixels: &[u8]) -> Result<Classification, ModelError> {
        if !self.config.ready {
            return Err(ModelError::NotReady);
        }
        if pixels.len() != self.config.input_size {
            return Err(ModelError::InvalidInput(format!(
                "Expected {} pixels, got {}",
                self.config.input_size,
                pixels.len()
            )));
        }

        Ok(Classification {
            predicted_class: self.config.predicted_class,
            confidence: self.config.confidence,
        })
    }

    fn is_ready(&self) -> bool {
        self.config.ready
    }

    fn heap_free(&self) -> u64 {
        self.config.heap_free
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&img)
            .unwrap();
        out
    }

    fn model(ready: bool) -> StaticModelService {
        StaticModelService::new(&ModelConfig {
            faces: vec![FaceDetection {
                score: 0.78,
                bbox: [86, 44, 128, 111],
                landmarks: None,
            }],
            predicted_class: 3,
            confidence: 0.91,
            ready,
            ..ModelConfig::default()
        })
    }

    #[tokio::test]
    async fn test_detect_validates_jpeg() {
        let faces = model(true).detect(&jpeg(320, 240)).await.unwrap();
        assert_eq!(faces.len(), 1);

        let err = model(true).detect(b"not a jpeg").await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidImage(_)));
    }

    #[tokio::test]
    async fn test_classify_checks_input_size() {
        let result = model(true).classify(&[0u8; 3072]).await.unwrap();
        assert_eq!(result.predicted_class, 3);

        let err = model(true).classify(&[0u8; 27648]).await.unwrap_err();
        assert_eq!(err.to_string(), "Expected 3072 pixels, got 27648");
    }

    #[tokio::test]
    async fn test_not_ready() {
        let model = model(false);
        assert!(!model.is_ready());
        assert_eq!(
            model.classify(&[0u8; 3072]).await.unwrap_err(),
            ModelError::NotReady
        );
        assert_eq!(
            model.detect(&jpeg(8, 8)).await.unwrap_err(),
            ModelError::NotReady
        );
    }
}
