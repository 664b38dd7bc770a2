use std::collections::HashMap;
use std::io;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::http::headers::Headers;
use crate::http::request::{split_target, Method, Request};

/// Longest method token; a request line whose first 7 bytes contain no space
/// must start with one of these or the stream is not HTTP.
const SEVEN_BYTE_METHODS: [&[u8]; 2] = [b"OPTIONS", b"CONNECT"];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("request incomplete")]
    Incomplete,
    #[error("request line exceeds {0} bytes")]
    UriTooLong(usize),
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("invalid header line: {0}")]
    InvalidHeader(String),
    #[error("header section exceeds {0} bytes")]
    HeadersTooLarge(usize),
    #[error("invalid content length: {0}")]
    InvalidContentLength(String),
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("connection closed mid-request")]
    UnexpectedEof,
    #[error("timed out reading request")]
    Timeout,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Bounds applied while reading a single request.
#[derive(Debug, Clone)]
pub struct ParseLimits {
    pub max_uri_length: usize,
    pub max_header_bytes: usize,
    pub max_body_size: usize,
    pub read_timeout: Duration,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_uri_length: 2083,
            max_header_bytes: 16 * 1024,
            max_body_size: 8 * 1024 * 1024,
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Parses the request line and header block at the front of `buf`.
///
/// Returns the request (with an empty body) and the number of bytes the head
/// occupied. `ParseError::Incomplete` means more bytes are needed. A stream
/// that does not start with an HTTP method yields a request flagged as
/// mismatched and consumes nothing.
pub fn parse_http_request(buf: &[u8], limits: &ParseLimits) -> Result<(Request, usize), ParseError> {
    if is_mismatched(buf) {
        return Ok((Request::mismatched(), 0));
    }

    let line_end = match buf.iter().position(|&b| b == b'\n') {
        Some(idx) => idx,
        None if buf.len() >= limits.max_uri_length => {
            return Err(ParseError::UriTooLong(limits.max_uri_length));
        }
        None => return Err(ParseError::Incomplete),
    };

    let line = trim_cr(&buf[..line_end]);
    if line.len() >= limits.max_uri_length {
        return Err(ParseError::UriTooLong(limits.max_uri_length));
    }

    let line = String::from_utf8_lossy(line);
    let mut parts = line.split(' ').filter(|p| !p.is_empty());

    let (method_str, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v)) => (m, t, v),
        _ => return Err(ParseError::MalformedRequestLine),
    };

    let method = Method::from_str(method_str).unwrap_or(Method::GET);
    let (path, query) = split_target(target);

    let (headers, head_len) = parse_headers(&buf[line_end + 1..], limits)?;

    let request = Request {
        method,
        target: target.to_string(),
        path,
        query,
        version: version.to_string(),
        headers,
        body: Vec::new(),
        params: HashMap::new(),
        mismatched: false,
    };

    Ok((request, line_end + 1 + head_len))
}

fn parse_headers(buf: &[u8], limits: &ParseLimits) -> Result<(Headers, usize), ParseError> {
    let mut headers = Headers::new();
    let mut offset = 0;

    loop {
        let rest = &buf[offset..];
        let line_end = match rest.iter().position(|&b| b == b'\n') {
            Some(idx) => idx,
            None if buf.len() > limits.max_header_bytes => {
                return Err(ParseError::HeadersTooLarge(limits.max_header_bytes));
            }
            None => return Err(ParseError::Incomplete),
        };

        let line = trim_cr(&rest[..line_end]);
        offset += line_end + 1;

        if offset > limits.max_header_bytes {
            return Err(ParseError::HeadersTooLarge(limits.max_header_bytes));
        }

        if line.is_empty() {
            return Ok((headers, offset));
        }

        let line = String::from_utf8_lossy(line);
        let (key, value) = line
            .split_once(": ")
            .ok_or_else(|| ParseError::InvalidHeader(line.to_string()))?;

        headers.set(key, value);
    }
}

fn is_mismatched(buf: &[u8]) -> bool {
    if buf.len() < 7 {
        return false;
    }

    let head = &buf[..7];
    !head.contains(&b' ') && !SEVEN_BYTE_METHODS.contains(&head)
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Reads one request from `io`, using `buf` as the connection's carry-over
/// buffer.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly before
/// sending anything. Bytes belonging to a following request stay in `buf`.
pub async fn read_request<T>(
    io: &mut T,
    buf: &mut BytesMut,
    limits: &ParseLimits,
) -> Result<Option<Request>, ParseError>
where
    T: AsyncRead + Unpin,
{
    let (mut request, consumed) = loop {
        match parse_http_request(&buf[..], limits) {
            Ok(parsed) => break parsed,
            Err(ParseError::Incomplete) => {}
            Err(e) => return Err(e),
        }

        if fill(io, buf, limits.read_timeout).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(ParseError::UnexpectedEof);
        }
    };

    if request.mismatched {
        return Ok(Some(request));
    }

    buf.advance(consumed);

    let content_length = request.header("Content-Length").map(str::to_string);

    match content_length {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidContentLength(raw.clone()))?;

            if len > limits.max_body_size {
                return Err(ParseError::BodyTooLarge(limits.max_body_size));
            }

            while buf.len() < len {
                if fill(io, buf, limits.read_timeout).await? == 0 {
                    return Err(ParseError::UnexpectedEof);
                }
            }

            request.body = buf.split_to(len).to_vec();
        }
        None if matches!(request.method, Method::POST | Method::PUT) => {
            request.body = read_available(io, buf, limits.max_body_size).await?;
        }
        None => {}
    }

    Ok(Some(request))
}

async fn fill<T>(io: &mut T, buf: &mut BytesMut, read_timeout: Duration) -> Result<usize, ParseError>
where
    T: AsyncRead + Unpin,
{
    match tokio::time::timeout(read_timeout, io.read_buf(buf)).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(ParseError::Timeout),
    }
}

/// Drains whatever is buffered or can be read without waiting.
async fn read_available<T>(io: &mut T, buf: &mut BytesMut, max: usize) -> Result<Vec<u8>, ParseError>
where
    T: AsyncRead + Unpin,
{
    loop {
        if buf.len() > max {
            return Err(ParseError::BodyTooLarge(max));
        }

        match tokio::time::timeout(Duration::ZERO, io.read_buf(buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => return Err(e.into()),
        }
    }

    Ok(buf.split().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req, &ParseLimits::default()).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn seven_byte_methods_are_not_mismatched() {
        assert!(!is_mismatched(b"OPTIONS * HTTP/1.1\r\n"));
        assert!(!is_mismatched(b"CONNECT host:443 HTTP/1.1\r\n"));
        assert!(is_mismatched(b"\x16\x03\x01\x02\x00\x01\x00"));
    }
}
