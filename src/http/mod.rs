//! HTTP protocol implementation.
//!
//! This module implements an HTTP/1.x server engine with persistent
//! connections, static file serving and response compression.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`connection`**: The per-connection engine implementing the request-response state machine
//! - **`parser`**: Reads requests off a transport into [`request::Request`] values
//! - **`request`**: HTTP request representation and target decoding
//! - **`headers`**: Ordered, case-insensitive header collection
//! - **`response`**: Status table and the buffered response every handler writes into
//! - **`writer`**: Status line and chunk framing, flushing buffered output to the client
//! - **`encoding`**: gzip/deflate negotiation and compression
//! - **`static_files`**: Static resource lookup, directory listings and byte ranges
//!
//! # Connection State Machine
//!
//! Each client connection goes through a state machine:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Parsing   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request parsed
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Route, run middleware and handler under the compute budget
//!        └──────┬───────────┘
//!               │ Response buffered
//!               ▼
//!        ┌──────────────────┐
//!        │   Responding     │ ← Flush the response to the client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Persistent → Parsing (same connection)
//!               └─ Otherwise  → Closing (half-close, drain, drop)
//! ```
//!
//! A parse failure skips `Dispatching`: either an error response goes straight
//! to `Responding` or the connection closes silently.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trellis::config::Config;
//! use trellis::http::connection::{Connection, ConnectionContext};
//! use trellis::router::Router;
//! use trellis::server::supervisor::Shutdown;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = Arc::new(ConnectionContext::new(Config::default(), Router::new(), Shutdown::new()));
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!
//!     loop {
//!         let (socket, _addr) = listener.accept().await?;
//!         let ctx = ctx.clone();
//!         tokio::spawn(async move {
//!             let mut conn = Connection::new(socket, ctx);
//!             if let Err(e) = conn.run().await {
//!                 eprintln!("Connection error: {}", e);
//!             }
//!         });
//!     }
//! }
//! ```

pub mod connection;
pub mod encoding;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod static_files;
pub mod writer;
