//! # rstdt-client
//!
//! Client library for rstdt.
//!
//! This crate provides:
//! - Async TCP connection with request and connect deadlines
//! - High-level search API returning decoded records
//! - Raw header requests for probing unsupported opcodes and resources

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
