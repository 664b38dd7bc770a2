use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::http::encoding::Compressor;
use crate::http::headers::Headers;
use crate::http::writer;

/// HTTP status codes the server knows a reason phrase for.
///
/// Any other numeric code is carried as `Other` and rendered with the
/// reason phrase "Unknown Status".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 100 Continue
    Continue,
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 204 No Content
    NoContent,
    /// 206 Partial Content
    PartialContent,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 302 Found
    Found,
    /// 304 Not Modified
    NotModified,
    /// 307 Temporary Redirect
    TemporaryRedirect,
    /// 308 Permanent Redirect
    PermanentRedirect,
    /// 400 Bad Request
    BadRequest,
    /// 401 Unauthorized
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 408 Request Timeout
    RequestTimeout,
    /// 412 Precondition Failed
    PreconditionFailed,
    /// 413 Content Too Large
    ContentTooLarge,
    /// 414 URI Too Long
    UriTooLong,
    /// 416 Range Not Satisfiable
    RangeNotSatisfiable,
    /// 417 Expectation Failed
    ExpectationFailed,
    /// 500 Internal Server Error
    InternalServerError,
    /// 501 Not Implemented
    NotImplemented,
    /// 502 Bad Gateway
    BadGateway,
    /// 503 Service Unavailable
    ServiceUnavailable,
    /// 504 Gateway Timeout
    GatewayTimeout,
    /// 505 HTTP Version Not Supported
    HttpVersionNotSupported,
    /// Any code without an entry in the table
    Other(u16),
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use trellis::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// assert_eq!(StatusCode::Other(299).as_u16(), 299);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::PartialContent => 206,
            StatusCode::MovedPermanently => 301,
            StatusCode::Found => 302,
            StatusCode::NotModified => 304,
            StatusCode::TemporaryRedirect => 307,
            StatusCode::PermanentRedirect => 308,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::RequestTimeout => 408,
            StatusCode::PreconditionFailed => 412,
            StatusCode::ContentTooLarge => 413,
            StatusCode::UriTooLong => 414,
            StatusCode::RangeNotSatisfiable => 416,
            StatusCode::ExpectationFailed => 417,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::BadGateway => 502,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::GatewayTimeout => 504,
            StatusCode::HttpVersionNotSupported => 505,
            StatusCode::Other(code) => *code,
        }
    }

    /// Maps a numeric code back onto the table, falling back to `Other`.
    pub fn from_u16(code: u16) -> Self {
        match code {
            100 => StatusCode::Continue,
            200 => StatusCode::Ok,
            201 => StatusCode::Created,
            204 => StatusCode::NoContent,
            206 => StatusCode::PartialContent,
            301 => StatusCode::MovedPermanently,
            302 => StatusCode::Found,
            304 => StatusCode::NotModified,
            307 => StatusCode::TemporaryRedirect,
            308 => StatusCode::PermanentRedirect,
            400 => StatusCode::BadRequest,
            401 => StatusCode::Unauthorized,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            408 => StatusCode::RequestTimeout,
            412 => StatusCode::PreconditionFailed,
            413 => StatusCode::ContentTooLarge,
            414 => StatusCode::UriTooLong,
            416 => StatusCode::RangeNotSatisfiable,
            417 => StatusCode::ExpectationFailed,
            500 => StatusCode::InternalServerError,
            501 => StatusCode::NotImplemented,
            502 => StatusCode::BadGateway,
            503 => StatusCode::ServiceUnavailable,
            504 => StatusCode::GatewayTimeout,
            505 => StatusCode::HttpVersionNotSupported,
            other => StatusCode::Other(other),
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use trellis::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::ContentTooLarge.reason_phrase(), "Content Too Large");
    /// assert_eq!(StatusCode::Other(299).reason_phrase(), "Unknown Status");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::PartialContent => "Partial Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::NotModified => "Not Modified",
            StatusCode::TemporaryRedirect => "Temporary Redirect",
            StatusCode::PermanentRedirect => "Permanent Redirect",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::PreconditionFailed => "Precondition Failed",
            StatusCode::ContentTooLarge => "Content Too Large",
            StatusCode::UriTooLong => "URI Too Long",
            StatusCode::RangeNotSatisfiable => "Range Not Satisfiable",
            StatusCode::ExpectationFailed => "Expectation Failed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::GatewayTimeout => "Gateway Timeout",
            StatusCode::HttpVersionNotSupported => "HTTP Version Not Supported",
            StatusCode::Other(_) => "Unknown Status",
        }
    }

    pub fn is_error(&self) -> bool {
        self.as_u16() >= 400
    }
}

/// How the body of a response is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Content-Length` followed by exactly that many bytes
    Fixed,
    /// `Transfer-Encoding: chunked`
    Chunked,
}

/// An HTTP response under construction.
///
/// Handlers write into the response through [`Response::send`] and its
/// helpers. Output is buffered; the connection flushes it to the client once
/// the handler returns. The header block is emitted at most once per response.
pub struct Response {
    version: String,
    headers: Headers,
    compressor: Option<Arc<dyn Compressor>>,
    status: StatusCode,
    discard_body: bool,
    headers_sent: bool,
    closing: bool,
    keep_alive: (usize, Duration),
    ready: bool,
    framing: Framing,
    out: Vec<u8>,
    server_name: String,
    compress_threshold: usize,
    body_bytes: usize,
}

impl Response {
    /// Creates a response that answers with the given HTTP version on its
    /// status line.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            headers: Headers::new(),
            compressor: None,
            status: StatusCode::Ok,
            discard_body: false,
            headers_sent: false,
            closing: false,
            keep_alive: (0, Duration::ZERO),
            ready: true,
            framing: Framing::Fixed,
            out: Vec::new(),
            server_name: "Trellis/0.1".to_string(),
            compress_threshold: 32 * 1024,
            body_bytes: 0,
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn with_compress_threshold(mut self, threshold: usize) -> Self {
        self.compress_threshold = threshold;
        self
    }

    pub fn with_compressor(mut self, compressor: Option<Arc<dyn Compressor>>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Sets the `Keep-Alive` budget advertised on persistent responses.
    pub fn with_keep_alive(mut self, max: usize, timeout: Duration) -> Self {
        self.keep_alive = (max, timeout);
        self
    }

    /// Marks whether the underlying channel can carry a response yet.
    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// The base send operation every helper funnels into.
    ///
    /// Does nothing while the channel is not ready. When a compressor was
    /// negotiated and the body exceeds the compression threshold, the body is
    /// encoded and `Content-Length` reflects the encoded size.
    pub fn send(
        &mut self,
        body: &[u8],
        last_modified: Option<SystemTime>,
        mime: &str,
        status: StatusCode,
    ) -> io::Result<()> {
        if !self.ready {
            return Ok(());
        }

        if self.headers_sent {
            match self.framing {
                Framing::Chunked => self.send_chunk(body),
                Framing::Fixed => debug!(
                    dropped = body.len(),
                    "Body already framed by Content-Length, dropping extra bytes"
                ),
            }
            return Ok(());
        }

        self.status = status;

        let encoded = match &self.compressor {
            Some(compressor) if body.len() > self.compress_threshold => {
                self.headers.set("Content-Encoding", compressor.name());
                Some(compressor.encode(body)?)
            }
            _ => None,
        };
        let payload = encoded.as_deref().unwrap_or(body);

        self.framing = Framing::Fixed;
        self.write_head(Some(payload.len()), last_modified, mime);

        if !self.discard_body {
            self.out.extend_from_slice(payload);
        }
        self.body_bytes += payload.len();

        Ok(())
    }

    /// Sends trimmed text as `text/plain` with status 200.
    pub fn send_text(&mut self, text: &str) -> io::Result<()> {
        self.send_with(text, "text/plain", StatusCode::Ok)
    }

    /// Sends trimmed text with an explicit MIME type and status. Blank text
    /// discards the body.
    pub fn send_with(&mut self, text: &str, mime: &str, status: StatusCode) -> io::Result<()> {
        if text.trim().is_empty() {
            self.discard_body = true;
        }

        self.send(text.trim().as_bytes(), None, mime, status)
    }

    pub fn json(&mut self, text: &str, status: StatusCode) -> io::Result<()> {
        self.send_with(text, "application/json", status)
    }

    /// Sends the status's reason phrase as the body.
    pub fn send_error(&mut self, status: StatusCode) -> io::Result<()> {
        self.send_error_with(status, status.reason_phrase())
    }

    /// Sends an error with a custom message. Every error other than 404 ends
    /// the connection after this response.
    pub fn send_error_with(&mut self, status: StatusCode, message: &str) -> io::Result<()> {
        if status != StatusCode::NotFound {
            self.closing = true;
        }

        self.send(message.as_bytes(), None, "text/plain", status)
    }

    /// Sets `Location` and answers 301 (permanent) or 307.
    pub fn redirect(&mut self, url: &str, permanent: bool) -> io::Result<()> {
        self.set_header("Location", url);

        if permanent {
            self.send_error(StatusCode::MovedPermanently)
        } else {
            self.send_error(StatusCode::TemporaryRedirect)
        }
    }

    /// Emits the header block for a chunked body. Subsequent data goes
    /// through [`Response::send_chunk`] and ends with [`Response::finish`].
    pub fn start_chunked(
        &mut self,
        last_modified: Option<SystemTime>,
        mime: &str,
        status: StatusCode,
    ) {
        if !self.ready || self.headers_sent {
            return;
        }

        self.status = status;
        self.framing = Framing::Chunked;
        self.write_head(None, last_modified, mime);
    }

    /// Writes one chunk. Empty slices are skipped since a zero-length chunk
    /// terminates the body.
    pub fn send_chunk(&mut self, bytes: &[u8]) {
        if !self.ready || self.discard_body || bytes.is_empty() {
            return;
        }

        if !self.headers_sent {
            self.start_chunked(None, "application/octet-stream", self.status);
        }

        writer::write_chunk(&mut self.out, bytes);
        self.body_bytes += bytes.len();
    }

    /// Terminates a chunked body.
    pub fn finish(&mut self) {
        if self.ready && self.framing == Framing::Chunked && !self.discard_body {
            writer::write_last_chunk(&mut self.out);
        }
    }

    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.set(key, value);
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_discard_body(&mut self, discard: bool) {
        self.discard_body = discard;
    }

    pub fn discards_body(&self) -> bool {
        self.discard_body
    }

    pub fn set_closing(&mut self, closing: bool) {
        self.closing = closing;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Number of body bytes produced so far, after encoding.
    pub fn body_len(&self) -> usize {
        self.body_bytes
    }

    /// Bytes buffered for the client.
    pub fn output(&self) -> &[u8] {
        &self.out
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    /// Drops everything written so far so an error can be sent in its place.
    /// The closing flag survives.
    pub fn reset(&mut self) {
        self.headers.clear();
        self.out.clear();
        self.headers_sent = false;
        self.discard_body = false;
        self.framing = Framing::Fixed;
        self.status = StatusCode::Ok;
        self.body_bytes = 0;
    }

    fn write_head(&mut self, content_length: Option<usize>, last_modified: Option<SystemTime>, mime: &str) {
        if self.status.as_u16() < 400 {
            let modified = last_modified.unwrap_or_else(SystemTime::now);
            self.headers.set("Last-Modified", httpdate::fmt_http_date(modified));
        }

        match (self.framing, content_length) {
            (Framing::Fixed, Some(len)) => self.headers.set("Content-Length", len.to_string()),
            _ => self.headers.set("Transfer-Encoding", "chunked"),
        }

        if self.discard_body {
            self.headers.set("Content-Type", mime);
        } else {
            self.headers.set("Content-Type", format!("{mime};charset=utf-8"));
        }

        self.headers.set("Server", &self.server_name);
        self.headers.set("Date", httpdate::fmt_http_date(SystemTime::now()));
        self.headers
            .set("Connection", if self.closing { "close" } else { "keep-alive" });
        self.headers.set("Accept-Ranges", "bytes");

        if !self.closing {
            let (max, timeout) = self.keep_alive;
            self.headers.set(
                "Keep-Alive",
                format!("timeout={}, max={}", timeout.as_secs(), max),
            );
        }

        self.narrow_exposed_headers();

        writer::write_status_line(&mut self.out, &self.version, self.status);
        self.headers.write(&mut self.out);
        self.headers_sent = true;
    }

    /// Applies `Access-Control-Expose-Headers`: `*` exposes everything, any
    /// other list restricts the header block to the names it contains.
    fn narrow_exposed_headers(&mut self) {
        let exposed = match self.headers.get("Access-Control-Expose-Headers") {
            Some(value) if value != "*" => value.to_string(),
            _ => return,
        };

        let allowed: Vec<&str> = exposed
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();

        self.headers
            .retain(|h| allowed.iter().any(|name| name.eq_ignore_ascii_case(&h.key)));
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("closing", &self.closing)
            .field("headers_sent", &self.headers_sent)
            .field("framing", &self.framing)
            .field("buffered", &self.out.len())
            .finish()
    }
}
