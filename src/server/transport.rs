use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// A byte stream a connection can be served over.
///
/// Secure transports report `is_secure` and complete their handshake in
/// `handshake`, which resolves to whether the channel can carry responses.
/// Plain transports are always ready.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    fn is_secure(&self) -> bool {
        false
    }

    fn handshake(&mut self) -> impl Future<Output = io::Result<bool>> + Send {
        std::future::ready(Ok(true))
    }
}

impl Transport for TcpStream {}

/// In-memory pipe, used to drive connections without a socket.
impl Transport for DuplexStream {}
