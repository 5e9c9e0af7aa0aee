//! TCP server implementation.

use crate::catalog::CatalogProvider;
use crate::config::Config;
use crate::error::ServerError;
use crate::handler::CommandHandler;
use crate::session::{Session, SessionTimeouts};
use rstdt_protocol::QuantizePolicy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Per-phase session deadlines.
    pub timeouts: SessionTimeouts,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Quantization policy for encoding search results.
    pub quantize_policy: QuantizePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], rstdt_protocol::DEFAULT_PORT)),
            timeouts: SessionTimeouts::default(),
            max_connections: 1000,
            quantize_policy: QuantizePolicy::Lenient,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds the runtime configuration from loaded settings.
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            timeouts: config.network.session_timeouts(),
            max_connections: config.network.max_connections,
            quantize_policy: config.catalog.quantize_policy,
        }
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_quantize_policy(mut self, policy: QuantizePolicy) -> Self {
        self.quantize_policy = policy;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for rstdt.
pub struct Server {
    config: ServerConfig,
    handler: Arc<CommandHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server answering from `catalog`.
    pub fn new(config: ServerConfig, catalog: Arc<dyn CatalogProvider>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let handler = CommandHandler::new(catalog).with_policy(config.quantize_policy);
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let handler = self.handler.clone();
                            let stats = self.stats.clone();
                            let timeouts = self.config.timeouts;
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = Self::handle_connection(
                                    stream,
                                    addr,
                                    &handler,
                                    &stats,
                                    timeouts,
                                    &mut conn_shutdown,
                                )
                                .await;

                                match result {
                                    Ok(()) | Err(ServerError::ShuttingDown) => {}
                                    Err(e) => {
                                        tracing::debug!("Connection {} error: {}", addr, e);
                                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    }
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Runs one session on an accepted connection.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        handler: &CommandHandler,
        stats: &Arc<ServerStats>,
        timeouts: SessionTimeouts,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!("Client connected: {}", addr);
        stream.set_nodelay(true).ok();

        let mut session = Session::new(addr, timeouts).with_stats(stats.clone());
        let result = tokio::select! {
            result = session.run(&mut stream, handler) => result,
            _ = shutdown.recv() => {
                tracing::debug!("[{}] Shutdown signal received", addr);
                Err(ServerError::ShuttingDown)
            }
        };

        tracing::debug!(
            "[{}] Session {} served {} request(s) in {:?}",
            addr,
            session.id,
            session.request_count(),
            session.age()
        );
        result
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, Resource};
    use rstdt_protocol::{decode_entries, Record};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn scenario_catalog() -> Arc<InMemoryCatalog> {
        let catalog = InMemoryCatalog::from_resources(vec![Resource::new(
            "hotels",
            vec![
                Record::new(1, 250, 5, 0b1111),
                Record::new(2, 150, 3, 0b1010),
                Record::new(5, 350, 5, 0b1111),
            ],
        )])
        .unwrap();
        Arc::new(catalog)
    }

    async fn start_server(server: Server) -> (Arc<Server>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(server);

        let running = server.clone();
        tokio::spawn(async move {
            let _ = running.serve(listener).await;
        });

        (server, addr)
    }

    async fn read_response(stream: &mut TcpStream) -> Vec<u8> {
        let mut prefix = [0u8; 2];
        stream.read_exact(&mut prefix).await.unwrap();
        let mut body = vec![0u8; u16::from_be_bytes(prefix) as usize];
        stream.read_exact(&mut body).await.unwrap();
        body
    }

    #[tokio::test]
    async fn test_server_basic() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let server = Server::new(config, Arc::new(InMemoryCatalog::sample()));
        assert!(!server.is_running());
        assert_eq!(server.config().max_connections, 1000);
    }

    #[test]
    fn test_server_config_from_config() {
        let mut config = Config::default();
        config.network.max_connections = 5;
        config.catalog.quantize_policy = QuantizePolicy::Strict;

        let server_config = ServerConfig::from_config(&config);
        assert_eq!(server_config.bind_addr.port(), 9999);
        assert_eq!(server_config.max_connections, 5);
        assert_eq!(server_config.quantize_policy, QuantizePolicy::Strict);
        assert_eq!(server_config.timeouts.idle, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_search_scenario() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let (_server, addr) = start_server(Server::new(config, scenario_catalog())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&[0x00, 0x00, 0x64, 0x01, 0x2C])
            .await
            .unwrap();

        let mut prefix = [0u8; 2];
        stream.read_exact(&mut prefix).await.unwrap();
        assert_eq!(prefix, [0x00, 0x04]);

        let mut body = [0u8; 4];
        stream.read_exact(&mut body).await.unwrap();
        let records = decode_entries(&body).unwrap();
        let ids: Vec<u8> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        // Prices arrive as bucket representatives
        assert_eq!(records[0].price, 300);
        assert_eq!(records[1].price, 200);
    }

    #[tokio::test]
    async fn test_unknown_resource_scenario() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let (_server, addr) = start_server(Server::new(config, scenario_catalog())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[0b0000_0100]).await.unwrap();
        assert!(read_response(&mut stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_persistent_connection() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let (server, addr) = start_server(Server::new(config, scenario_catalog())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(&[0x00, 0x00, 0x64, 0x01, 0x2C])
            .await
            .unwrap();
        let first = read_response(&mut stream).await;

        stream
            .write_all(&[0x00, 0x01, 0x2C, 0x01, 0x90])
            .await
            .unwrap();
        let second = read_response(&mut stream).await;

        assert_eq!(first, vec![0x00, 0x7F, 0x00, 0xA6]);
        assert_eq!(second, vec![0x01, 0x7F]);
        // Counted while the connection is still open
        assert_eq!(server.stats().requests_total.load(Ordering::Relaxed), 2);
        assert_eq!(server.stats().connections_active.load(Ordering::Relaxed), 1);

        drop(stream);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.stats().connections_active.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_failed_session_does_not_affect_others() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let (server, addr) = start_server(Server::new(config, scenario_catalog())).await;

        let mut broken = TcpStream::connect(addr).await.unwrap();
        broken.write_all(&[0x00, 0x00]).await.unwrap();
        broken.shutdown().await.unwrap();

        let mut healthy = TcpStream::connect(addr).await.unwrap();
        healthy
            .write_all(&[0x00, 0x00, 0x00, 0x00, 0xC8])
            .await
            .unwrap();
        assert_eq!(read_response(&mut healthy).await, vec![0x00, 0xA6]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.stats().errors_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config =
            ServerConfig::new("127.0.0.1:0".parse().unwrap()).with_max_connections(1);
        let (server, addr) = start_server(Server::new(config, scenario_catalog())).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        first
            .write_all(&[0x00, 0x00, 0x64, 0x01, 0x2C])
            .await
            .unwrap();
        assert_eq!(read_response(&mut first).await.len(), 4);

        // The second connection is accepted and dropped at once
        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 2];
        let n = tokio::time::timeout(Duration::from_secs(1), second.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);

        let stats = server.stats();
        assert_eq!(stats.connections_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(stats.connections_total.load(Ordering::Relaxed), 1);

        // The admitted connection keeps working
        first
            .write_all(&[0x00, 0x00, 0x00, 0x00, 0xC8])
            .await
            .unwrap();
        assert_eq!(read_response(&mut first).await, vec![0x00, 0xA6]);
    }

    #[tokio::test]
    async fn test_strict_policy_serves_exact_records() {
        let timeouts = SessionTimeouts {
            idle: Duration::from_secs(5),
            read: Duration::from_millis(500),
            write: Duration::from_millis(500),
        };
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_timeouts(timeouts)
            .with_quantize_policy(QuantizePolicy::Strict);
        assert_eq!(config.timeouts, timeouts);

        let (server, addr) = start_server(Server::new(config, scenario_catalog())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&[0x00, 0x00, 0x64, 0x01, 0x2C])
            .await
            .unwrap();
        assert_eq!(
            read_response(&mut stream).await,
            vec![0x00, 0x7F, 0x00, 0xA6]
        );
        assert_eq!(server.config().quantize_policy, QuantizePolicy::Strict);
    }

    #[tokio::test]
    async fn test_shutdown_stops_server() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let server = Arc::new(Server::new(config, scenario_catalog()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let running = server.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(server.is_running());

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!server.is_running());
    }
}
