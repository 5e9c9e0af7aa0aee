//! Per-connection protocol state machine.
//!
//! ```text
//! AwaitHeader -> AwaitPayload -> Dispatch -> Respond -> AwaitHeader
//!      |                                                    
//!      +--> Closed (peer closed before a header byte)
//! ```

use crate::error::ServerError;
use crate::handler::{CommandHandler, Route};
use crate::server::ServerStats;
use rstdt_protocol::{Header, PriceRange, ProtocolError, HEADER_SIZE, PRICE_RANGE_SIZE};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next header byte.
    AwaitHeader,
    /// Header decoded, reading the price-range payload.
    AwaitPayload,
    /// Resolving the request.
    Dispatch,
    /// Writing the framed response.
    Respond,
    /// Peer closed the connection or the session failed.
    Closed,
}

/// Deadlines applied to each phase of a request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// How long to wait for the next header byte.
    pub idle: Duration,
    /// How long to wait for a payload once its header arrived.
    pub read: Duration,
    /// How long a response write may take.
    pub write: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(300),
            read: Duration::from_secs(10),
            write: Duration::from_secs(10),
        }
    }
}

/// A client session.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    state: SessionState,
    timeouts: SessionTimeouts,

    /// Requests answered, including rejected ones.
    request_count: u64,

    /// Requests answered with an empty response because they were rejected.
    rejected_count: u64,

    created_at: Instant,

    /// Server-wide counters updated as requests are answered.
    stats: Option<Arc<ServerStats>>,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr, timeouts: SessionTimeouts) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            state: SessionState::AwaitHeader,
            timeouts,
            request_count: 0,
            rejected_count: 0,
            created_at: Instant::now(),
            stats: None,
        }
    }

    /// Reports each answered request to the server's counters.
    pub fn with_stats(mut self, stats: Arc<ServerStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Handles one request cycle: one header read, an optional payload read,
    /// at most one catalog query and exactly one response write.
    ///
    /// Returns the state the session is left in: `AwaitHeader` when another
    /// request may follow, `Closed` when the peer closed the connection.
    pub async fn serve_one<S>(
        &mut self,
        stream: &mut S,
        handler: &CommandHandler,
    ) -> Result<SessionState, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.state = SessionState::AwaitHeader;
        let mut header_buf = [0u8; HEADER_SIZE];
        let n = with_deadline("idle", self.timeouts.idle, stream.read(&mut header_buf)).await?;
        if n == 0 {
            self.state = SessionState::Closed;
            return Ok(self.state);
        }

        let header = Header::decode(header_buf[0]);
        tracing::debug!(
            "[{}] Header: opcode={} resource_id={}",
            self.remote_addr,
            header.opcode.bits(),
            header.resource_id
        );

        let response = match handler.route(header) {
            Route::Search { resource } => {
                self.state = SessionState::AwaitPayload;
                let mut payload = [0u8; PRICE_RANGE_SIZE];
                tokio::time::timeout(self.timeouts.read, read_full(stream, &mut payload))
                    .await
                    .map_err(|_| ServerError::Timeout { phase: "payload" })??;
                let range = PriceRange::decode(&payload)?;

                self.state = SessionState::Dispatch;
                handler.search(&resource, range)?
            }
            Route::Reject(reason) => {
                self.state = SessionState::Dispatch;
                self.rejected_count += 1;
                handler.reject(reason)
            }
        };

        self.state = SessionState::Respond;
        if let Some(stats) = &self.stats {
            stats.requests_total.fetch_add(1, Ordering::Relaxed);
        }
        with_deadline("write", self.timeouts.write, stream.write_all(&response)).await?;
        self.request_count += 1;

        tracing::debug!(
            "[{}] Response: {} byte body",
            self.remote_addr,
            response.len() - rstdt_protocol::LENGTH_PREFIX_SIZE
        );

        self.state = SessionState::AwaitHeader;
        Ok(self.state)
    }

    /// Serves requests until the peer closes, the idle deadline passes, or an
    /// error ends the session.
    pub async fn run<S>(&mut self, stream: &mut S, handler: &CommandHandler) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            match self.serve_one(stream, handler).await {
                Ok(SessionState::Closed) => {
                    tracing::debug!("[{}] Connection closed by client", self.remote_addr);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if e.is_idle_timeout() => {
                    tracing::debug!("[{}] Idle timeout", self.remote_addr);
                    self.state = SessionState::Closed;
                    return Ok(());
                }
                Err(e) => {
                    self.state = SessionState::Closed;
                    return Err(e);
                }
            }
        }
    }
}

async fn with_deadline<F, T>(phase: &'static str, limit: Duration, fut: F) -> Result<T, ServerError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ServerError::Timeout { phase }),
    }
}

/// Fills `buf` completely; a close before that is a truncated frame.
///
/// `read_exact` would lose the partial byte count carried by `TruncatedInput`.
async fn read_full<S>(stream: &mut S, buf: &mut [u8]) -> Result<(), ServerError>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(ProtocolError::TruncatedInput {
                needed: buf.len(),
                available: filled,
            }
            .into());
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use tokio::io::duplex;

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12345)
    }

    fn test_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(InMemoryCatalog::sample()))
    }

    fn short_timeouts() -> SessionTimeouts {
        SessionTimeouts {
            idle: Duration::from_millis(100),
            read: Duration::from_millis(100),
            write: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(test_addr(), SessionTimeouts::default());
        assert_eq!(session.state(), SessionState::AwaitHeader);
        assert_eq!(session.request_count(), 0);
        assert!(!session.id.is_empty());
    }

    #[tokio::test]
    async fn test_serve_one_search() {
        // hotels [200, 260] -> id 1 (250)
        let mut stream = tokio_test::io::Builder::new()
            .read(&[0x00, 0x00, 0xC8, 0x01, 0x04])
            .write(&[0x00, 0x02, 0x00, 0x7F])
            .build();

        let handler = test_handler();
        let mut session = Session::new(test_addr(), SessionTimeouts::default());
        let state = session.serve_one(&mut stream, &handler).await.unwrap();

        assert_eq!(state, SessionState::AwaitHeader);
        assert_eq!(session.request_count(), 1);
    }

    #[tokio::test]
    async fn test_serve_one_unknown_resource_reads_no_payload() {
        // resource 5 does not exist; the next byte is treated as a new header
        let mut stream = tokio_test::io::Builder::new()
            .read(&[0b0001_0100])
            .write(&[0x00, 0x00])
            .build();

        let handler = test_handler();
        let mut session = Session::new(test_addr(), SessionTimeouts::default());
        session.serve_one(&mut stream, &handler).await.unwrap();
        assert_eq!(session.rejected_count(), 1);

        let state = session.serve_one(&mut stream, &handler).await.unwrap();
        assert_eq!(state, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_serve_one_unsupported_opcode() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[0b0110_0000])
            .write(&[0x00, 0x00])
            .build();

        let handler = test_handler();
        let mut session = Session::new(test_addr(), SessionTimeouts::default());
        session.serve_one(&mut stream, &handler).await.unwrap();
        assert_eq!(session.rejected_count(), 1);
        assert_eq!(session.request_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_on_eof() {
        let mut stream = tokio_test::io::Builder::new().build();
        let handler = test_handler();
        let mut session = Session::new(test_addr(), SessionTimeouts::default());

        let state = session.serve_one(&mut stream, &handler).await.unwrap();
        assert_eq!(state, SessionState::Closed);
        assert_eq!(session.request_count(), 0);
    }

    #[tokio::test]
    async fn test_run_multiple_requests_in_order() {
        let (mut client, mut server) = duplex(256);
        let handler = Arc::new(test_handler());

        let task = {
            let handler = handler.clone();
            tokio::spawn(async move {
                let mut session = Session::new(test_addr(), SessionTimeouts::default());
                let result = session.run(&mut server, &handler).await;
                (result, session.request_count(), session.state())
            })
        };

        // search [100, 160] -> id 2; then unknown resource; then search [340, 400] -> id 5
        client
            .write_all(&[0x00, 0x00, 0x64, 0x00, 0xA0])
            .await
            .unwrap();
        client.write_all(&[0b0000_1100]).await.unwrap();
        client
            .write_all(&[0x00, 0x01, 0x54, 0x01, 0x90])
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let mut responses = Vec::new();
        client.read_to_end(&mut responses).await.unwrap();
        assert_eq!(
            responses,
            vec![0x00, 0x02, 0x00, 0xA6, 0x00, 0x00, 0x00, 0x02, 0x01, 0x7F]
        );

        let (result, count, state) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(count, 3);
        assert_eq!(state, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_stats_count_each_request() {
        let (mut client, mut server) = duplex(256);
        let stats = Arc::new(ServerStats::default());
        let handler = test_handler();
        let mut session =
            Session::new(test_addr(), SessionTimeouts::default()).with_stats(stats.clone());

        client
            .write_all(&[0x00, 0x00, 0x64, 0x00, 0xA0])
            .await
            .unwrap();
        session.serve_one(&mut server, &handler).await.unwrap();
        assert_eq!(stats.requests_total.load(Ordering::Relaxed), 1);

        client.write_all(&[0b0010_0000]).await.unwrap();
        session.serve_one(&mut server, &handler).await.unwrap();
        assert_eq!(stats.requests_total.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_write_timeout() {
        // A 4-byte pipe cannot hold the 12-byte response and the peer never reads
        let (mut client, mut server) = duplex(4);
        client
            .write_all(&[0x00, 0x00, 0x00, 0x01])
            .await
            .unwrap();

        let handler = test_handler();
        let mut session = Session::new(test_addr(), short_timeouts());

        let serve = session.serve_one(&mut server, &handler);
        let feed = async {
            // Last payload byte: search [0, 400] matches all five hotels
            client.write_all(&[0x90]).await.unwrap();
        };
        let (result, _) = tokio::join!(serve, feed);

        assert!(matches!(
            result,
            Err(ServerError::Timeout { phase: "write" })
        ));
        assert_eq!(session.state(), SessionState::Respond);
        drop(client);
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x00, 0x00, 0x64]).await.unwrap();
        client.shutdown().await.unwrap();

        let handler = test_handler();
        let mut session = Session::new(test_addr(), SessionTimeouts::default());
        let err = session.run(&mut server, &handler).await.unwrap_err();

        assert!(matches!(
            err,
            ServerError::Protocol(ProtocolError::TruncatedInput {
                needed: 4,
                available: 2
            })
        ));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_payload_timeout() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x00, 0x00]).await.unwrap();

        let handler = test_handler();
        let mut session = Session::new(test_addr(), short_timeouts());
        let err = session.serve_one(&mut server, &handler).await.unwrap_err();

        assert!(matches!(err, ServerError::Timeout { phase: "payload" }));
        assert_eq!(session.state(), SessionState::AwaitPayload);
        drop(client);
    }

    #[tokio::test]
    async fn test_idle_timeout_ends_session_cleanly() {
        let (_client, mut server) = duplex(64);

        let handler = test_handler();
        let mut session = Session::new(test_addr(), short_timeouts());
        session.run(&mut server, &handler).await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.request_count(), 0);
    }
}
