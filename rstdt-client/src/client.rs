//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use bytes::Bytes;
use rstdt_protocol::{decode_entries, encode_header, Header, PriceRange, Record, Request};
use std::sync::Arc;

/// High-level client for rstdt.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Searches a resource for records priced within `min..=max`.
    ///
    /// Returned records carry the representative values of their lookup
    /// buckets, not the catalog's exact values. An empty result means either
    /// no match or a rejected request; the wire does not distinguish the two.
    pub async fn search(
        &self,
        resource_id: u8,
        min: u16,
        max: u16,
    ) -> Result<Vec<Record>, ClientError> {
        self.search_range(resource_id, PriceRange::new(min, max)).await
    }

    /// Searches a resource with a prepared price range.
    pub async fn search_range(
        &self,
        resource_id: u8,
        range: PriceRange,
    ) -> Result<Vec<Record>, ClientError> {
        // Validates the resource id before anything is written
        encode_header(0, resource_id)?;
        let body = self.request(&Request::search(resource_id, range)).await?;
        Ok(decode_entries(&body)?)
    }

    /// Sends a header with an arbitrary opcode and returns the raw response body.
    ///
    /// Search opcodes are sent with an unbounded price range; every other
    /// opcode is sent as a bare header.
    pub async fn raw(&self, opcode: u8, resource_id: u8) -> Result<Bytes, ClientError> {
        let header = Header::decode(encode_header(opcode, resource_id)?);
        let request = if header.opcode.has_payload() {
            Request::search(resource_id, PriceRange::new(0, u16::MAX))
        } else {
            Request::bare(header)
        };
        self.request(&request).await
    }

    /// Sends a prepared request and returns the raw response body.
    pub async fn request(&self, request: &Request) -> Result<Bytes, ClientError> {
        self.conn.exchange(request).await
    }
}
