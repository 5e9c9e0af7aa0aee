//! Connection management.

use crate::error::ClientError;
use bytes::Bytes;
use rstdt_protocol::{Decoder, Encoder, Request};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Default read buffer size (1 KiB). Responses rarely exceed a few dozen bytes.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Minimum read buffer size.
pub const MIN_READ_BUFFER_SIZE: usize = 64;

/// Maximum read buffer size (64 KiB), enough for the largest response frame.
pub const MAX_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout, covering both the write and the full response read.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// A connection to an rstdt server.
///
/// The protocol has no request ids, so responses are matched to requests by
/// order alone. Each exchange holds the stream for its whole round trip.
pub struct Connection {
    config: ConnectionConfig,
    stream: Mutex<Option<TcpStream>>,
    /// Decoder for parsing responses.
    decoder: Mutex<Decoder>,
    connected: AtomicBool,
    requests_sent: AtomicU64,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            decoder: Mutex::new(Decoder::new()),
            connected: AtomicBool::new(false),
            requests_sent: AtomicU64::new(0),
        }
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let tcp_stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        tcp_stream.set_nodelay(true).ok();

        *self.stream.lock().await = Some(tcp_stream);
        self.decoder.lock().await.clear();
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!("Connected to {}", self.config.addr);
        Ok(())
    }

    /// Sends one request and waits for its response body.
    ///
    /// Any failure drops the stream: after a timeout or a short read the
    /// next response on the wire can no longer be matched to its request.
    pub async fn exchange(&self, request: &Request) -> Result<Bytes, ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }

        let encoded = Encoder::encode_request(request)?;

        let mut stream_guard = self.stream.lock().await;
        let stream = stream_guard.as_mut().ok_or(ClientError::NotConnected)?;
        let mut decoder = self.decoder.lock().await;

        tracing::debug!("Sending request ({} bytes)", encoded.len());
        let result = tokio::time::timeout(
            self.config.request_timeout,
            round_trip(stream, &mut decoder, &encoded, self.config.read_buffer_size),
        )
        .await
        .unwrap_or_else(|_| {
            tracing::debug!("Request timed out");
            Err(ClientError::Timeout)
        });

        match &result {
            Ok(body) => {
                self.requests_sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Response received ({} bytes)", body.len());
            }
            Err(e) => {
                tracing::debug!("Exchange failed, dropping connection: {}", e);
                self.connected.store(false, Ordering::SeqCst);
                decoder.clear();
                *stream_guard = None;
            }
        }

        result
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns the number of completed exchanges.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
        self.decoder.lock().await.clear();

        tracing::debug!("Connection closed");
        Ok(())
    }
}

async fn round_trip(
    stream: &mut TcpStream,
    decoder: &mut Decoder,
    encoded: &[u8],
    buffer_size: usize,
) -> Result<Bytes, ClientError> {
    stream.write_all(encoded).await?;

    let mut buf = vec![0u8; buffer_size];
    loop {
        if let Some(body) = decoder.decode_body()? {
            return Ok(body);
        }

        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        decoder.extend(&buf[..n]);
    }
}
