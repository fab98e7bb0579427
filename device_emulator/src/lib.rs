mod app;
mod http_server;
mod model_service;
mod static_model;
mod tcp_server;

pub mod config;

pub use app::start_app;
pub use http_server::{api_routes, HttpServer, PredictResponse, SharedState};
pub use model_service::{Classification, FaceDetection, FaceLandmarks, ModelError, ModelService};
pub use static_model::StaticModelService;
pub use tcp_server::{format_detection_log, TcpDeviceServer};
