use async_trait::async_trait;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{lookup_host, TcpStream},
    time::{timeout, timeout_at, Instant},
};
use tracing::instrument;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Timed out during {stage} after {limit:?}")]
    Timeout { stage: &'static str, limit: Duration },
    /// Nothing listening, host or network unreachable, or the name does
    /// not resolve.
    #[error("Device at {0} refused the connection or is unreachable")]
    ConnectionRefused(String),
    #[error("Socket error talking to {addr}: {source}")]
    Transport {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("Device answered with HTTP status {0}")]
    HttpStatus(u16),
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("Invalid device URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl TransportError {
    fn from_io(addr: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::AddrNotAvailable => {
                tracing::debug!("{} unreachable: {}", addr, err);
                TransportError::ConnectionRefused(addr.to_string())
            }
            _ => TransportError::Transport {
                addr: addr.to_string(),
                source: err,
            },
        }
    }
}

/// Opens the byte stream used for one exchange.
///
/// The stream is owned by [`TcpExchange::exchange`] and dropped before it
/// returns, which closes the socket on every path.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, addr: &str) -> io::Result<Self::Stream>;
}

// Lookup failures count as an unreachable host, same as the HTTP client's
// connect errors.
fn unresolved(addr: &str, reason: String) -> io::Error {
    io::Error::new(
        io::ErrorKind::HostUnreachable,
        format!("failed to resolve {}: {}", addr, reason),
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        let resolved: Vec<_> = lookup_host(addr)
            .await
            .map_err(|e| unresolved(addr, e.to_string()))?
            .collect();
        if resolved.is_empty() {
            return Err(unresolved(addr, "no addresses".into()));
        }

        let stream = TcpStream::connect(&resolved[..]).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Single-shot request/response over a raw stream.
///
/// The request ends when the write side is shut down and the response ends
/// when the peer closes the connection; there is no length prefix in either
/// direction.
#[derive(Debug, Clone)]
pub struct TcpExchange<C: Connector = TcpConnector> {
    connector: C,
    connect_timeout: Duration,
    total_timeout: Duration,
}

impl TcpExchange<TcpConnector> {
    pub fn new(connect_timeout: Duration, total_timeout: Duration) -> Self {
        Self::with_connector(TcpConnector, connect_timeout, total_timeout)
    }
}

impl<C: Connector> TcpExchange<C> {
    pub fn with_connector(connector: C, connect_timeout: Duration, total_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            total_timeout,
        }
    }

    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn exchange(
        &self,
        host: &str,
        port: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let addr = format!("{}:{}", host, port);
        let deadline = Instant::now() + self.total_timeout;
        let connect_limit = self.connect_timeout.min(self.total_timeout);

        tracing::info!("Connecting to {}", addr);
        let mut stream = match timeout(connect_limit, self.connector.connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TransportError::from_io(&addr, e)),
            Err(_) => {
                return Err(TransportError::Timeout {
                    stage: "connect",
                    limit: connect_limit,
                })
            }
        };

        let result = match timeout_at(deadline, send_and_receive(&mut stream, payload)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Err(TransportError::Timeout {
                stage: "exchange",
                limit: self.total_timeout,
            }),
            Ok(Err(e)) => Err(TransportError::from_io(&addr, e)),
            Err(_) => Err(TransportError::Timeout {
                stage: "exchange",
                limit: self.total_timeout,
            }),
        };

        drop(stream);
        tracing::info!("Connection to {} closed", addr);

        if let Ok(response) = &result {
            tracing::info!("Received {} bytes", response.len());
        }
        result
    }
}

async fn send_and_receive<S>(stream: &mut S, payload: &[u8]) -> io::Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(payload).await?;
    stream.flush().await?;
    // Half-close: the device reads until EOF, the read side stays open.
    stream.shutdown().await?;
    tracing::debug!("Sent {} bytes, write side closed", payload.len());

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(response)
}

/// Runs one raw TCP exchange with a fresh connection.
pub async fn exchange(
    host: &str,
    port: u16,
    payload: &[u8],
    connect_timeout: Duration,
    total_timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    TcpExchange::new(connect_timeout, total_timeout)
        .exchange(host, port, payload)
        .await
}
