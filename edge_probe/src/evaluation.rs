use crate::classifier::Classifier;
use crate::config::ClassificationConfig;
use crate::error::ProbeError;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelledSample {
    pub path: PathBuf,
    pub label: usize,
}

/// Collects samples laid out as `<dir>/<class_name>/<image>`.
///
/// Samples are returned in path order and cut to `limit`. Class directories
/// that do not exist are skipped.
pub fn collect_samples(
    dir: &Path,
    class_names: &[String],
    limit: Option<usize>,
) -> Result<Vec<LabelledSample>, ProbeError> {
    if !dir.is_dir() {
        return Err(ProbeError::Samples(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut samples = Vec::new();
    for (label, name) in class_names.iter().enumerate() {
        let class_dir = dir.join(name);
        if !class_dir.is_dir() {
            tracing::debug!("No samples for class {}", name);
            continue;
        }
        let entries = std::fs::read_dir(&class_dir)
            .map_err(|e| ProbeError::Samples(format!("{}: {}", class_dir.display(), e)))?;
        for entry in entries {
            let path = entry
                .map_err(|e| ProbeError::Samples(format!("{}: {}", class_dir.display(), e)))?
                .path();
            if path.is_file() {
                samples.push(LabelledSample { path, label });
            }
        }
    }

    samples.sort_by(|a, b| a.path.cmp(&b.path));
    if let Some(limit) = limit {
        samples.truncate(limit);
    }
    Ok(samples)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub failed: usize,
}

impl EvaluationSummary {
    pub fn successful(&self) -> usize {
        self.total - self.failed
    }

    /// Accuracy in percent over the samples the device answered.
    pub fn accuracy(&self) -> Option<f64> {
        match self.successful() {
            0 => None,
            n => Some(self.correct as f64 / n as f64 * 100.0),
        }
    }
}

impl fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Evaluation Summary ---")?;
        match self.accuracy() {
            Some(accuracy) => {
                writeln!(f, "Successful Tests:    {}", self.successful())?;
                writeln!(f, "Correct Predictions: {}", self.correct)?;
                writeln!(f, "Accuracy:            {:.2}%", accuracy)?;
            }
            None => writeln!(f, "No tests were completed successfully.")?,
        }
        if self.failed > 0 {
            writeln!(f, "Failed Requests:     {}", self.failed)?;
        }
        write!(f, "--------------------------")
    }
}

/// Classifies every sample once, one request at a time.
///
/// Failures are counted and the loop moves on; nothing is retried.
pub async fn evaluate<C: Classifier + ?Sized>(
    classifier: &C,
    samples: &[LabelledSample],
    config: &ClassificationConfig,
) -> EvaluationSummary {
    let mut summary = EvaluationSummary::default();
    let delay = config.sample_delay();
    let name = |index: i64| config.class_name(index);

    for (i, sample) in samples.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            sleep(delay).await;
        }
        summary.total += 1;
        let true_name = name(sample.label as i64);

        match classifier.classify(&sample.path).await {
            Ok(result) if result.predicted_class == sample.label as i64 => {
                summary.correct += 1;
                tracing::info!(
                    "Sample {}/{} ({}): correct",
                    i + 1,
                    samples.len(),
                    true_name
                );
            }
            Ok(result) => {
                summary.incorrect += 1;
                tracing::info!(
                    "Sample {}/{} ({}): incorrect, predicted {}",
                    i + 1,
                    samples.len(),
                    true_name,
                    name(result.predicted_class)
                );
            }
            Err(e) => {
                summary.failed += 1;
                tracing::error!(
                    kind = e.kind(),
                    "Sample {}/{} ({}) failed: {}",
                    i + 1,
                    samples.len(),
                    true_name,
                    e
                );
            }
        }
    }

    summary
}
