//! Server error types.

use crate::catalog::CatalogError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] rstdt_protocol::ProtocolError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("timed out during {phase}")]
    Timeout { phase: &'static str },

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Returns whether the error came from the peer going quiet rather than misbehaving.
    pub fn is_idle_timeout(&self) -> bool {
        matches!(self, ServerError::Timeout { phase: "idle" })
    }
}
