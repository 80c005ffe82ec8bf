//! Riemann TCP client
//!
//! Each request is a protobuf `Msg` prefixed by its length as a 4-byte
//! big-endian integer. The server answers every request with a framed `Msg`
//! whose `ok` field acknowledges the batch.

use super::proto::{Event, Msg};
use super::{EventSink, SinkError, SinkEvent};
use async_trait::async_trait;
use prost::Message;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

/// Largest response frame accepted from the server
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Configuration for the Riemann client
#[derive(Debug, Clone)]
pub struct RiemannConfig {
    /// `host:port` of the Riemann TCP listener
    pub address: String,
    /// Applied separately to connecting and to each request/response exchange
    pub timeout: Duration,
}

impl Default for RiemannConfig {
    fn default() -> Self {
        Self {
            address: "localhost:5555".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Riemann client holding a single lazily re-established connection
pub struct RiemannClient {
    config: RiemannConfig,
    connection: Mutex<Option<TcpStream>>,
}

impl RiemannClient {
    pub fn new(config: RiemannConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    /// Establish the connection up front so an unreachable server fails fast
    pub async fn connect(&self) -> Result<(), SinkError> {
        let stream = self.open().await?;
        *self.connection.lock().await = Some(stream);
        info!(address = %self.config.address, "Connected to Riemann");
        Ok(())
    }

    async fn open(&self) -> Result<TcpStream, SinkError> {
        let address = self.config.address.as_str();
        let stream = timeout(self.config.timeout, TcpStream::connect(address))
            .await
            .map_err(|_| self.timeout_error("connect"))?
            .map_err(|source| SinkError::Connect {
                address: address.to_string(),
                source,
            })?;

        stream.set_nodelay(true).map_err(|source| SinkError::Io {
            address: address.to_string(),
            source,
        })?;

        Ok(stream)
    }

    fn timeout_error(&self, operation: &'static str) -> SinkError {
        SinkError::Timeout {
            address: self.config.address.clone(),
            operation,
            timeout: self.config.timeout,
        }
    }

    /// Send one message and wait for the server's reply
    pub async fn send_message(&self, msg: &Msg) -> Result<Msg, SinkError> {
        let mut guard = self.connection.lock().await;
        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => {
                debug!(address = %self.config.address, "Reconnecting to Riemann");
                self.open().await?
            }
        };

        // The connection is only put back after a clean exchange
        let reply = self.exchange(&mut stream, &msg.encode_to_vec()).await?;
        *guard = Some(stream);

        if reply.ok == Some(false) || reply.error.is_some() {
            let reason = reply
                .error
                .unwrap_or_else(|| "server did not acknowledge".to_string());
            return Err(SinkError::Rejected(reason));
        }

        Ok(reply)
    }

    async fn exchange(&self, stream: &mut TcpStream, payload: &[u8]) -> Result<Msg, SinkError> {
        let frame = timeout(self.config.timeout, async {
            let len = u32::try_from(payload.len()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "request frame too large")
            })?;
            stream.write_u32(len).await?;
            stream.write_all(payload).await?;
            stream.flush().await?;

            let reply_len = stream.read_u32().await? as usize;
            if reply_len > MAX_FRAME_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("response frame of {} bytes exceeds limit", reply_len),
                ));
            }

            let mut buf = vec![0u8; reply_len];
            stream.read_exact(&mut buf).await?;
            Ok::<_, io::Error>(buf)
        })
        .await
        .map_err(|_| self.timeout_error("send"))?
        .map_err(|source| SinkError::Io {
            address: self.config.address.clone(),
            source,
        })?;

        Ok(Msg::decode(frame.as_slice())?)
    }
}

impl From<&SinkEvent> for Event {
    fn from(event: &SinkEvent) -> Self {
        Event {
            time: Some(chrono::Utc::now().timestamp()),
            state: Some(event.state.clone()),
            service: Some(event.service.clone()),
            host: event.host.clone(),
            tags: event.tags.clone(),
            ttl: Some(event.ttl),
            metric_d: Some(event.metric),
            ..Default::default()
        }
    }
}

#[async_trait]
impl EventSink for RiemannClient {
    async fn send_event(&self, event: &SinkEvent) -> Result<(), SinkError> {
        let msg = Msg {
            events: vec![Event::from(event)],
            ..Default::default()
        };
        self.send_message(&msg).await.map(|_| ())
    }
}
