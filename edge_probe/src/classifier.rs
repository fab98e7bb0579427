use crate::config::ClassificationConfig;
use crate::decoder;
use crate::detection::{ClassificationResult, DeviceResponse};
use crate::error::ProbeError;
use crate::http_exchange::HttpExchange;
use crate::preprocess::prepare_pixels;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &Path) -> Result<ClassificationResult, ProbeError>;
}

/// Classifies images with the HTTP classification firmware.
pub struct HttpClassifier {
    exchange: HttpExchange,
    config: ClassificationConfig,
}

impl HttpClassifier {
    pub fn new(exchange: HttpExchange, config: ClassificationConfig) -> Self {
        Self { exchange, config }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &Path) -> Result<ClassificationResult, ProbeError> {
        let payload = prepare_pixels(image, &self.config)?;
        let body = self.exchange.predict(&payload).await?;
        into_classification(decoder::decode(&body)?)
    }
}

pub(crate) fn into_classification(
    response: DeviceResponse,
) -> Result<ClassificationResult, ProbeError> {
    match response {
        DeviceResponse::JsonClassification(result) => Ok(result),
        other => Err(ProbeError::UnexpectedResponse {
            expected: "json_classification",
            got: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionResult;
    use axum::{routing::post, Json, Router};
    use image::{Rgb, RgbImage};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_http_classifier_sends_resized_pixels() {
        let router = Router::new().route(
            "/predict",
            post(|Json(body): Json<Value>| async move {
                let len = body["pixels"].as_array().map(Vec::len).unwrap_or(0);
                if len == 96 * 96 * 3 {
                    Json(json!({"success": true, "predicted_class": 5, "confidence": 0.7}))
                } else {
                    Json(json!({"success": false, "error_message": format!("got {} values", len)}))
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dog.png");
        RgbImage::from_pixel(32, 32, Rgb([1, 2, 3])).save(&path).unwrap();

        let exchange = HttpExchange::new(&url, Duration::from_secs(1), Duration::from_secs(2)).unwrap();
        let config = ClassificationConfig {
            width: 96,
            height: 96,
            ..ClassificationConfig::default()
        };
        let result = HttpClassifier::new(exchange.clone(), config)
            .classify(&path)
            .await
            .unwrap();
        assert_eq!(result.predicted_class, 5);

        let err = HttpClassifier::new(exchange, ClassificationConfig::default())
            .classify(&path)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "device_reported_failure");
        assert!(err.to_string().contains("got 3072 values"));
    }

    #[test]
    fn test_detection_response_is_unexpected() {
        let err = into_classification(DeviceResponse::Log(DetectionResult::default())).unwrap_err();
        assert_eq!(err.kind(), "unexpected_response");
    }
}
