use crate::model_service::{FaceDetection, ModelService};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

const LOG_TAG: &str = "FACE_DETECT_WIFI";
const RX_CAPACITY: usize = 100 * 1024;

/// Raw TCP side of the face detection firmware.
///
/// One connection at a time: the client sends a JPEG and half-closes, the
/// server answers with log lines and closes.
pub struct TcpDeviceServer<M: ModelService> {
    listener: TcpListener,
    model: Arc<M>,
    read_timeout: Duration,
    booted: Instant,
}

impl<M: ModelService> TcpDeviceServer<M> {
    pub async fn bind(model: Arc<M>, addr: &str, read_timeout: Duration) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            model,
            read_timeout,
            booted: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        tracing::info!("TCP server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            tracing::info!("Client connected from {}", peer);
                            if let Err(e) = self.handle(socket).await {
                                tracing::error!("Connection from {} failed: {}", peer, e);
                            }
                        }
                        Err(e) => tracing::error!("Failed to accept connection: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("TCP server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle(&self, mut socket: TcpStream) -> std::io::Result<()> {
        let mut rx = Vec::with_capacity(RX_CAPACITY);
        match tokio::time::timeout(self.read_timeout, socket.read_to_end(&mut rx)).await {
            Ok(read) => {
                read?;
            }
            Err(_) => {
                tracing::warn!("Receive timed out after {} bytes", rx.len());
                return Ok(());
            }
        }
        tracing::info!("Connection closed by client, {} bytes received", rx.len());

        let ticks = self.ticks();
        let reply = if rx.is_empty() {
            String::new()
        } else {
            match self.model.detect(&rx).await {
                Ok(faces) => format_detection_log(ticks, &faces),
                Err(e) => format!("E ({}) {}: {}\n", ticks, LOG_TAG, e),
            }
        };

        socket.write_all(reply.as_bytes()).await?;
        socket.shutdown().await?;
        tracing::info!("Sent {} bytes, connection closed", reply.len());
        Ok(())
    }

    fn ticks(&self) -> u128 {
        self.booted.elapsed().as_millis()
    }
}

/// Renders detections the way the firmware logs them: a count line, then
/// one box line per face, each followed by its landmark line when present.
pub fn format_detection_log(ticks: u128, faces: &[FaceDetection]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "I ({}) {}: Found {} face(s)", ticks, LOG_TAG, faces.len());
    for face in faces {
        let [x1, y1, x2, y2] = face.bbox;
        let _ = writeln!(
            out,
            "I ({}) {}: [score: {:.2}, x1: {}, y1: {}, x2: {}, y2: {}]",
            ticks, LOG_TAG, face.score, x1, y1, x2, y2
        );
        if let Some(lm) = &face.landmarks {
            let _ = writeln!(
                out,
                "I ({}) {}: [left_eye: [{}, {}], left_mouth: [{}, {}], nose: [{}, {}], right_eye: [{}, {}], right_mouth: [{}, {}]]",
                ticks,
                LOG_TAG,
                lm.left_eye[0],
                lm.left_eye[1],
                lm.left_mouth[0],
                lm.left_mouth[1],
                lm.nose[0],
                lm.nose[1],
                lm.right_eye[0],
                lm.right_eye[1],
                lm.right_mouth[0],
                lm.right_mouth[1],
            );
        }
    }
    out
}
