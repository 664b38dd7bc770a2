//! Accepting and scheduling connections.
//!
//! - **`listener`**: the [`listener::Server`] facade and accept loop
//! - **`pool`**: bounded worker pool with caller-runs backpressure
//! - **`supervisor`**: compute budget watchdog and shutdown signal
//! - **`transport`**: byte streams a connection can run over

pub mod listener;
pub mod pool;
pub mod supervisor;
pub mod transport;
