use image::imageops::FilterType;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub device: DeviceConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    pub job: Job,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_device_port")]
    pub port: u16,
    pub http_url: String,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub total_timeout_ms: u64,
}

fn default_device_port() -> u16 {
    3333
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl DeviceConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }
}

/// Resampling filter used when resizing images before they are sent.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PreprocessConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default)]
    pub filter: ResizeFilter,
}

fn default_width() -> u32 {
    320
}

fn default_height() -> u32 {
    240
}

fn default_quality() -> u8 {
    100
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            quality: default_quality(),
            filter: ResizeFilter::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RenderConfig {
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub display: bool,
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    /// Treat a response without detections as a failure.
    #[serde(default)]
    pub require_detections: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassificationConfig {
    #[serde(default = "default_classification_side")]
    pub width: u32,
    #[serde(default = "default_classification_side")]
    pub height: u32,
    #[serde(default = "default_classification_filter")]
    pub filter: ResizeFilter,
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,
    #[serde(default)]
    pub delay_between_samples_ms: u64,
}

fn default_classification_side() -> u32 {
    32
}

fn default_classification_filter() -> ResizeFilter {
    ResizeFilter::Nearest
}

fn default_class_names() -> Vec<String> {
    [
        "airplane",
        "automobile",
        "bird",
        "cat",
        "deer",
        "dog",
        "frog",
        "horse",
        "ship",
        "truck",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            width: default_classification_side(),
            height: default_classification_side(),
            filter: default_classification_filter(),
            class_names: default_class_names(),
            delay_between_samples_ms: 0,
        }
    }
}

impl ClassificationConfig {
    pub fn class_name(&self, index: i64) -> &str {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.class_names.get(i))
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.delay_between_samples_ms)
    }
}

/// What a single invocation of the binary does.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Detect {
        image: PathBuf,
    },
    Classify {
        image: PathBuf,
        #[serde(default)]
        label: Option<String>,
    },
    Evaluate {
        samples_dir: PathBuf,
        #[serde(default)]
        limit: Option<usize>,
    },
    Status,
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no working directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("EP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize::<Config>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_yaml(yaml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize::<Config>()
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = from_yaml(
            r#"
log_level: info
device:
  host: 192.168.0.111
  http_url: http://192.168.0.111
job:
  kind: detect
  image: imagens/face.jpg
"#,
        )
        .unwrap();

        assert_eq!(config.device.get_address(), "192.168.0.111:3333");
        assert_eq!(config.device.total_timeout(), Duration::from_secs(10));
        assert_eq!(config.preprocess.width, 320);
        assert_eq!(config.preprocess.height, 240);
        assert_eq!(config.preprocess.filter, ResizeFilter::Lanczos3);
        assert_eq!(config.classification.filter, ResizeFilter::Nearest);
        assert_eq!(config.classification.class_names.len(), 10);
        assert!(!config.render.display);
        assert!(matches!(config.job, Job::Detect { .. }));
    }

    #[test]
    fn test_evaluate_job_and_filter_override() {
        let config = from_yaml(
            r#"
log_level: debug
device:
  host: 10.0.0.2
  port: 4444
  http_url: http://10.0.0.2
classification:
  width: 96
  height: 96
  filter: nearest
preprocess:
  filter: catmull_rom
  quality: 60
job:
  kind: evaluate
  samples_dir: data/cifar
  limit: 100
"#,
        )
        .unwrap();

        assert_eq!(config.preprocess.filter, ResizeFilter::CatmullRom);
        assert_eq!(config.preprocess.quality, 60);
        assert_eq!(config.classification.width, 96);
        match config.job {
            Job::Evaluate { samples_dir, limit } => {
                assert_eq!(samples_dir, PathBuf::from("data/cifar"));
                assert_eq!(limit, Some(100));
            }
            other => panic!("unexpected job {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let err = from_yaml(
            r#"
log_level: trace
device:
  host: 10.0.0.2
  http_url: http://10.0.0.2
job:
  kind: status
"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("not a supported minimum log level"));
    }

    #[test]
    fn test_class_name_lookup() {
        let classification = ClassificationConfig::default();
        assert_eq!(classification.class_name(3), "cat");
        assert_eq!(classification.class_name(-1), "Unknown");
        assert_eq!(classification.class_name(10), "Unknown");
    }
}
