//! rstdt-server - TCP server for the rstdt search protocol.
//!
//! Accepts connections, reads one-byte headers and price-range payloads,
//! searches the configured catalog and answers with length-prefixed bodies
//! of packed entries.

pub mod catalog;
pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod session;

pub use catalog::{CatalogError, CatalogProvider, InMemoryCatalog, Resource};
pub use config::{CatalogConfig, Config, ConfigError, NetworkConfig};
pub use error::ServerError;
pub use handler::{CommandHandler, RejectReason, Route};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::{Session, SessionState, SessionTimeouts};
