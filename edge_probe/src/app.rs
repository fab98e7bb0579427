use crate::classifier::{into_classification, Classifier, HttpClassifier};
use crate::config::{ClassificationConfig, Config, Job};
use crate::decoder;
use crate::detection::{ClassificationResult, DetectionResult, DeviceResponse};
use crate::error::ProbeError;
use crate::evaluation::{collect_samples, evaluate, EvaluationSummary};
use crate::http_exchange::HttpExchange;
use crate::preprocess::ImagePreprocessor;
use crate::render::{RenderedImage, ResultRenderer};
use crate::transport::TcpExchange;
use std::path::{Path, PathBuf};

pub async fn start_app(config: Config) -> Result<(), ProbeError> {
    match &config.job {
        Job::Detect { image } => {
            let (detections, _) = run_detection(&config, image).await?;
            println!("Detected {} face(s)", detections.len());
            for (i, detection) in detections.iter().enumerate() {
                let bbox = &detection.bbox;
                println!(
                    "  #{} score={} box=({}, {}, {}, {}) landmarks={}",
                    i + 1,
                    bbox.score
                        .map(|s| format!("{:.2}", s))
                        .unwrap_or_else(|| "n/a".into()),
                    bbox.x1,
                    bbox.y1,
                    bbox.x2,
                    bbox.y2,
                    if detection.landmarks.is_some() { "yes" } else { "no" }
                );
            }
        }
        Job::Classify { image, label } => {
            let result = run_classification(&config, image).await?;
            println!(
                "{}",
                classification_report(&config.classification, &result, label.as_deref())
            );
        }
        Job::Evaluate { samples_dir, limit } => {
            let summary = run_evaluation(&config, samples_dir, *limit).await?;
            println!("{}", summary);
        }
        Job::Status => {
            let status = run_status(&config).await?;
            println!(
                "Device ready: {}, heap free: {}",
                status.model_initialized.unwrap_or(true),
                heap_free(&status)
            );
        }
    }

    Ok(())
}

/// Preprocess, exchange over raw TCP, decode and render one image.
pub async fn run_detection(
    config: &Config,
    image: &Path,
) -> Result<(DetectionResult, RenderedImage), ProbeError> {
    let frame = ImagePreprocessor::new(&config.preprocess).prepare(image)?;

    let exchange = TcpExchange::new(
        config.device.connect_timeout(),
        config.device.total_timeout(),
    );
    let raw = exchange
        .exchange(&config.device.host, config.device.port, frame.as_bytes())
        .await?;

    let response = decoder::decode(&raw)?;
    let detections = match &response {
        DeviceResponse::Log(result) | DeviceResponse::JsonDetections(result) => result.clone(),
        other => {
            return Err(ProbeError::UnexpectedResponse {
                expected: "detections",
                got: other.kind(),
            })
        }
    };
    tracing::info!("Decoded {} detection(s)", detections.len());

    if detections.is_empty() && config.render.require_detections {
        return Err(ProbeError::NoDetections);
    }

    let renderer = ResultRenderer::new(&config.render)?;
    let output_path = config
        .render
        .output_dir
        .as_deref()
        .map(|dir| annotated_path(dir, image));
    let rendered = renderer.render(&frame, &response, output_path.as_deref())?;

    Ok((detections, rendered))
}

pub async fn run_classification(
    config: &Config,
    image: &Path,
) -> Result<ClassificationResult, ProbeError> {
    classifier(config)?.classify(image).await
}

pub async fn run_evaluation(
    config: &Config,
    samples_dir: &Path,
    limit: Option<usize>,
) -> Result<EvaluationSummary, ProbeError> {
    let class_names = &config.classification.class_names;
    let samples = collect_samples(samples_dir, class_names, limit)?;
    tracing::info!("Starting evaluation for {} samples", samples.len());

    let classifier = classifier(config)?;
    Ok(evaluate(&classifier, &samples, &config.classification).await)
}

pub async fn run_status(config: &Config) -> Result<ClassificationResult, ProbeError> {
    let body = http_exchange(config)?.status().await?;
    into_classification(decoder::decode(&body)?)
}

fn http_exchange(config: &Config) -> Result<HttpExchange, ProbeError> {
    Ok(HttpExchange::new(
        &config.device.http_url,
        config.device.connect_timeout(),
        config.device.total_timeout(),
    )?)
}

fn classifier(config: &Config) -> Result<HttpClassifier, ProbeError> {
    Ok(HttpClassifier::new(
        http_exchange(config)?,
        config.classification.clone(),
    ))
}

fn annotated_path(output_dir: &Path, image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    output_dir.join(format!("{}_annotated.jpg", stem))
}

fn heap_free(result: &ClassificationResult) -> String {
    result
        .heap_free
        .map(|bytes| format!("{} bytes", bytes))
        .unwrap_or_else(|| "N/A".into())
}

pub fn classification_report(
    config: &ClassificationConfig,
    result: &ClassificationResult,
    true_label: Option<&str>,
) -> String {
    let mut lines = vec!["--- Inference Result ---".to_string()];
    if let Some(label) = true_label {
        lines.push(format!("True Class:      {}", label));
    }
    lines.push(format!(
        "Predicted Class: {} ({})",
        result.predicted_class,
        config.class_name(result.predicted_class)
    ));
    lines.push(format!("Confidence:      {:.4}", result.confidence));
    lines.push(format!("Device Heap Free: {}", heap_free(result)));
    lines.push("------------------------".to_string());
    lines.join("\n")
}
