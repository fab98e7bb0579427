use crate::decoder::DecodeError;
use crate::preprocess::PreprocessError;
use crate::render::RenderError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Exchange failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Decoding failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),
    #[error("Device returned no detections")]
    NoDetections,
    #[error("Unexpected response kind: expected {expected}, got {got}")]
    UnexpectedResponse {
        expected: &'static str,
        got: &'static str,
    },
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Sample discovery failed: {0}")]
    Samples(String),
}

impl ProbeError {
    /// Short stable name of the failure kind, used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Preprocess(PreprocessError::NotFound(_)) => "not_found",
            ProbeError::Preprocess(_) => "preprocess",
            ProbeError::Transport(TransportError::Timeout { .. }) => "timeout",
            ProbeError::Transport(TransportError::ConnectionRefused(_)) => "connection_refused",
            ProbeError::Transport(TransportError::HttpStatus(_)) => "http_status",
            ProbeError::Transport(TransportError::InvalidUrl { .. }) => "config",
            ProbeError::Transport(_) => "transport_error",
            ProbeError::Decode(DecodeError::MalformedResponse(_)) => "malformed_response",
            ProbeError::Decode(DecodeError::DeviceReportedFailure(_)) => "device_reported_failure",
            ProbeError::Render(_) => "render",
            ProbeError::NoDetections => "no_detections",
            ProbeError::UnexpectedResponse { .. } => "unexpected_response",
            ProbeError::Config(_) => "config",
            ProbeError::Samples(_) => "samples",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kind_names() {
        let cases: Vec<(ProbeError, &str)> = vec![
            (
                TransportError::ConnectionRefused("10.255.255.1:3333".into()).into(),
                "connection_refused",
            ),
            (
                TransportError::Timeout {
                    stage: "connect",
                    limit: Duration::from_millis(100),
                }
                .into(),
                "timeout",
            ),
            (
                TransportError::InvalidUrl {
                    url: "192.168.0.111".into(),
                    reason: "relative URL without a base".into(),
                }
                .into(),
                "config",
            ),
            (TransportError::HttpStatus(503).into(), "http_status"),
            (ProbeError::NoDetections, "no_detections"),
        ];

        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{}", err);
        }
    }
}
