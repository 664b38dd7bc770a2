use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::StatusCode;

const CRLF: &[u8] = b"\r\n";

/// Appends `VERSION CODE REASON\r\n`.
pub fn write_status_line(out: &mut Vec<u8>, version: &str, status: StatusCode) {
    let status_line = format!(
        "{} {} {}",
        version,
        status.as_u16(),
        status.reason_phrase()
    );
    out.extend_from_slice(status_line.as_bytes());
    out.extend_from_slice(CRLF);
}

/// Appends one chunk: hex length, CRLF, the bytes, CRLF.
pub fn write_chunk(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(format!("{:x}", bytes.len()).as_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(bytes);
    out.extend_from_slice(CRLF);
}

/// Appends the zero-length chunk that ends a chunked body.
pub fn write_last_chunk(out: &mut Vec<u8>) {
    out.extend_from_slice(b"0\r\n\r\n");
}

/// Pushes a buffered response onto a stream, resuming after short writes.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self { buffer, written: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.written
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
