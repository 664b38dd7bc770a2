//! Trellis - HTTP/1.1 server library
//!
//! Routing trie, request parsing, buffered responses, middleware chains and a
//! supervised connection engine.

pub mod config;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;
