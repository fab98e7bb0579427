mod app;
mod classifier;
mod error;
mod evaluation;

pub mod config;
pub mod decoder;
pub mod detection;
pub mod http_exchange;
pub mod preprocess;
pub mod render;
pub mod transport;

pub use app::{
    classification_report, run_classification, run_detection, run_evaluation, run_status,
    start_app,
};
pub use classifier::{Classifier, HttpClassifier};
pub use error::ProbeError;
pub use evaluation::{collect_samples, evaluate, EvaluationSummary, LabelledSample};
