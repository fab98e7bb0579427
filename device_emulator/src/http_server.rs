use crate::model_service::{ModelError, ModelService};
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tracing::instrument;

pub struct SharedState<M: ModelService> {
    pub model: Arc<M>,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct PredictRequest {
    pixels: Vec<u8>,
}

/// Body of both `/predict` and `/status`. Failures are reported in-band
/// with a 200 status, like the firmware does.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub success: bool,
    pub predicted_class: i64,
    pub confidence: f32,
    pub error_message: String,
    pub heap_free: u64,
    pub model_initialized: bool,
}

impl PredictResponse {
    fn failure<M: ModelService>(model: &M, message: String) -> Self {
        Self {
            success: false,
            predicted_class: -1,
            confidence: 0.0,
            error_message: message,
            heap_free: model.heap_free(),
            model_initialized: model.is_ready(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
}

pub async fn healthcheck() -> impl IntoResponse {
    Json(Status {
        status: "Available".into(),
    })
}

#[instrument(skip(state, body), fields(len = body.len()))]
async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    body: Bytes,
) -> Json<PredictResponse> {
    let model = state.model.as_ref();
    let request: PredictRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Rejected request body: {}", e);
            return Json(PredictResponse::failure(model, format!("Invalid request: {}", e)));
        }
    };

    match model.classify(&request.pixels).await {
        Ok(result) => {
            tracing::info!(
                "Predicted class {} with confidence {:.6}",
                result.predicted_class,
                result.confidence
            );
            Json(PredictResponse {
                success: true,
                predicted_class: result.predicted_class,
                confidence: result.confidence,
                error_message: String::new(),
                heap_free: model.heap_free(),
                model_initialized: model.is_ready(),
            })
        }
        Err(e) => {
            tracing::warn!("Inference failed: {}", e);
            Json(PredictResponse::failure(model, e.to_string()))
        }
    }
}

async fn status<M: ModelService>(State(state): State<SharedState<M>>) -> Json<PredictResponse> {
    let model = state.model.as_ref();
    let message = if model.is_ready() {
        String::new()
    } else {
        ModelError::NotReady.to_string()
    };
    Json(PredictResponse {
        success: model.is_ready(),
        confidence: 0.0,
        ..PredictResponse::failure(model, message)
    })
}

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/predict", post(predict::<M>))
        .route("/status", get(status::<M>))
        .route("/health", get(healthcheck))
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(model: Arc<M>, addr: &str) -> anyhow::Result<Self> {
        let router = Router::new()
            .merge(api_routes::<M>())
            .with_state(SharedState { model });

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn run(self, shutdown_rx: Receiver<()>) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("HTTP server listening on {}", self.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::static_model::StaticModelService;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::broadcast;

    async fn start(config: ModelConfig) -> (SocketAddr, broadcast::Sender<()>, JoinHandle<anyhow::Result<()>>) {
        let model = Arc::new(StaticModelService::new(&config));
        let server = HttpServer::new(model, "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = broadcast::channel(1);
        let handle = server.run(rx).unwrap();
        (addr, tx, handle)
    }

    async fn request(addr: SocketAddr, method: &str, path: &str, body: &str) -> Value {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let raw = format!(
            "{} {} HTTP/1.1\r\nHost: device\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            method,
            path,
            body.len(),
            body
        );
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        let (_, body) = response.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn canned() -> ModelConfig {
        ModelConfig {
            predicted_class: 3,
            confidence: 0.91,
            heap_free: 12345,
            ..ModelConfig::default()
        }
    }

    #[tokio::test]
    async fn test_predict_success() {
        let (addr, _tx, _) = start(canned()).await;
        let body = json!({ "pixels": vec![7u8; 3072] }).to_string();

        let response = request(addr, "POST", "/predict", &body).await;
        assert_eq!(response["success"], true);
        assert_eq!(response["predicted_class"], 3);
        assert_eq!(response["error_message"], "");
        assert_eq!(response["heap_free"], 12345);
    }

    #[tokio::test]
    async fn test_predict_failures_are_in_band() {
        let (addr, _tx, _) = start(canned()).await;

        let short = json!({ "pixels": [1, 2, 3] }).to_string();
        let response = request(addr, "POST", "/predict", &short).await;
        assert_eq!(response["success"], false);
        assert_eq!(response["predicted_class"], -1);
        assert_eq!(response["error_message"], "Expected 3072 pixels, got 3");

        let response = request(addr, "POST", "/predict", r#"{"pixels": [300]}"#).await;
        assert_eq!(response["success"], false);
        assert!(response["error_message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn test_status_reflects_readiness() {
        let (addr, _tx, _) = start(canned()).await;
        let response = request(addr, "GET", "/status", "").await;
        assert_eq!(response["success"], true);
        assert_eq!(response["model_initialized"], true);

        let (addr, _tx, _) = start(ModelConfig {
            ready: false,
            ..canned()
        })
        .await;
        let response = request(addr, "GET", "/status", "").await;
        assert_eq!(response["success"], false);
        assert_eq!(response["error_message"], "Model not initialized");
    }

    #[tokio::test]
    async fn test_health_and_graceful_shutdown() {
        let (addr, tx, handle) = start(canned()).await;
        let response = request(addr, "GET", "/health", "").await;
        assert_eq!(response["status"], "Available");

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
