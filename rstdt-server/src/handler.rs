//! Request routing and search execution.

use crate::catalog::CatalogProvider;
use crate::error::ServerError;
use bytes::BytesMut;
use rstdt_protocol::{Encoder, Header, Opcode, PriceRange, QuantizePolicy};
use std::sync::Arc;

/// Where a decoded header leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Search a known resource; a price-range payload follows.
    Search { resource: String },
    /// Answer with an empty response and read nothing further.
    Reject(RejectReason),
}

/// Why a request was answered with an empty response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownResource(u8),
    UnsupportedOpcode(u8),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnknownResource(id) => write!(f, "unknown resource id {}", id),
            RejectReason::UnsupportedOpcode(op) => write!(f, "unsupported opcode {}", op),
        }
    }
}

/// Resolves requests against a catalog and produces framed responses.
pub struct CommandHandler {
    catalog: Arc<dyn CatalogProvider>,
    policy: QuantizePolicy,
}

impl CommandHandler {
    /// Creates a handler with lenient quantization.
    pub fn new(catalog: Arc<dyn CatalogProvider>) -> Self {
        Self {
            catalog,
            policy: QuantizePolicy::Lenient,
        }
    }

    /// Sets the quantization policy used when encoding results.
    pub fn with_policy(mut self, policy: QuantizePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> QuantizePolicy {
        self.policy
    }

    /// Decides how to answer a header.
    ///
    /// The resource is resolved first; a search on an unknown resource is
    /// rejected without consuming its payload.
    pub fn route(&self, header: Header) -> Route {
        let resource = self.catalog.resource_name(header.resource_id);
        match (header.opcode, resource) {
            (Opcode::Search, Some(resource)) => Route::Search { resource },
            (_, None) => Route::Reject(RejectReason::UnknownResource(header.resource_id)),
            (Opcode::Unsupported(op), Some(_)) => {
                Route::Reject(RejectReason::UnsupportedOpcode(op))
            }
        }
    }

    /// Runs a search and returns the framed response.
    pub fn search(&self, resource: &str, range: PriceRange) -> Result<BytesMut, ServerError> {
        let records = self.catalog.search(resource, range.min, range.max);
        tracing::debug!(
            "Search {} [{}, {}] matched {} record(s)",
            resource,
            range.min,
            range.max,
            records.len()
        );

        let response = Encoder::encode_response_with(&records, self.policy)?;
        tracing::debug!("Packed response: {}", hex::encode(&response));
        Ok(response)
    }

    /// Returns the framed empty response for a rejected request.
    pub fn reject(&self, reason: RejectReason) -> BytesMut {
        tracing::warn!("Rejecting request: {}", reason);
        Encoder::empty_response()
    }
}
