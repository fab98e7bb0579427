use crate::preprocess::PixelPayload;
use crate::transport::TransportError;
use bytes::Bytes;
use std::time::Duration;
use tracing::instrument;

/// JSON-over-HTTP exchange used by the classification firmware.
///
/// Unlike the raw TCP exchange the body is framed by HTTP itself, so a
/// response is complete as soon as the client library says so.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    client: reqwest::Client,
    base_url: String,
    total_timeout: Duration,
}

impl HttpExchange {
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        total_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let url = reqwest::Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(total_timeout)
            .build()
            .map_err(TransportError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            total_timeout,
        })
    }

    pub fn predict_url(&self) -> String {
        format!("{}/predict", self.base_url)
    }

    pub fn status_url(&self) -> String {
        format!("{}/status", self.base_url)
    }

    /// `POST /predict` with the flattened pixels, returning the raw JSON body.
    #[instrument(skip(self, payload), fields(pixels = payload.pixels.len()))]
    pub async fn predict(&self, payload: &PixelPayload) -> Result<Bytes, TransportError> {
        let request = self.client.post(self.predict_url()).json(payload);
        self.send(request).await
    }

    /// `GET /status`, returning the raw JSON body.
    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<Bytes, TransportError> {
        let request = self.client.get(self.status_url());
        self.send(request).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Bytes, TransportError> {
        let response = request.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Device answered with status {}", status);
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        tracing::info!("Received {} bytes", body.len());
        Ok(body)
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                stage: "http",
                limit: self.total_timeout,
            }
        } else if err.is_connect() {
            TransportError::ConnectionRefused(self.base_url.clone())
        } else {
            TransportError::Http(err)
        }
    }
}

/// Sends one classification request to `url` (the device base URL).
pub async fn exchange_http(
    url: &str,
    payload: &PixelPayload,
    timeout: Duration,
) -> Result<Bytes, TransportError> {
    HttpExchange::new(url, timeout, timeout)?.predict(payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    #[test]
    fn test_invalid_base_url_is_rejected() {
        for url in ["192.168.0.111", "ftp://device", "http://"] {
            let err = HttpExchange::new(url, Duration::from_secs(1), Duration::from_secs(1))
                .unwrap_err();
            assert!(
                matches!(&err, TransportError::InvalidUrl { url: u, .. } if u == url),
                "{} -> {:?}",
                url,
                err
            );
        }

        assert!(HttpExchange::new(
            "https://device.local/",
            Duration::from_secs(1),
            Duration::from_secs(1)
        )
        .is_ok());
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_unreachable() {
        let exchange = HttpExchange::new(
            "http://device.invalid",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = exchange.status().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionRefused(_)), "{:?}", err);
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_predict_posts_pixels_json() {
        let router = Router::new().route(
            "/predict",
            post(|Json(body): Json<Value>| async move {
                let count = body["pixels"].as_array().map(|a| a.len()).unwrap_or(0);
                Json(json!({
                    "success": true,
                    "predicted_class": 3,
                    "confidence": 0.91,
                    "heap_free": count,
                }))
            }),
        );
        let url = serve(router).await;

        let payload = PixelPayload {
            pixels: vec![7; 3072],
        };
        let body = exchange_http(&url, &payload, Duration::from_secs(2))
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["heap_free"], 3072);
        assert_eq!(value["predicted_class"], 3);
    }

    #[tokio::test]
    async fn test_non_success_status_is_distinct_from_connection_failure() {
        let router = Router::new().route(
            "/status",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let url = serve(router).await;

        let exchange =
            HttpExchange::new(&url, Duration::from_secs(1), Duration::from_secs(2)).unwrap();
        let err = exchange.status().await.unwrap_err();
        assert!(matches!(err, TransportError::HttpStatus(503)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let exchange =
            HttpExchange::new(&closed, Duration::from_secs(1), Duration::from_secs(2)).unwrap();
        let err = exchange.status().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionRefused(_)));
    }

    #[tokio::test]
    async fn test_slow_device_times_out() {
        let router = Router::new().route(
            "/predict",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let url = serve(router).await;

        let payload = PixelPayload { pixels: vec![0; 4] };
        let err = exchange_http(&url, &payload, Duration::from_millis(300))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Timeout { stage: "http", .. }));
    }

    #[test]
    fn test_urls_ignore_trailing_slash() {
        let exchange = HttpExchange::new(
            "http://192.168.0.111/",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(exchange.predict_url(), "http://192.168.0.111/predict");
        assert_eq!(exchange.status_url(), "http://192.168.0.111/status");
    }
}
