use std::collections::HashMap;
use std::fmt;

use percent_encoding::percent_decode_str;
use url::form_urlencoded;

use crate::http::headers::Headers;

/// HTTP request methods.
///
/// Every method the server recognises on the request line. An unrecognised
/// method token is parsed as `GET` rather than failing the whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// TRACE - Echo the received request back to the client
    TRACE,
    /// CONNECT - Establish a tunnel
    CONNECT,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string matches a known method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use trellis::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("TRACE"), Some(Method::TRACE));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "TRACE" => Some(Method::TRACE),
            "CONNECT" => Some(Method::CONNECT),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::CONNECT => "CONNECT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a parsed HTTP request from a client.
///
/// A request is owned by the connection that parsed it and is never shared
/// across connections. Everything except `params` is fixed once parsing
/// completes; `params` is filled in by the router.
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The raw request target as it appeared on the request line
    pub target: String,
    /// Percent-decoded path, without the query string
    pub path: String,
    /// Decoded query string pairs; a key without `=` maps to `"true"`
    pub query: HashMap<String, String>,
    /// HTTP version token (e.g. "HTTP/1.1")
    pub version: String,
    /// Request headers
    pub headers: Headers,
    /// Request body bytes
    pub body: Vec<u8>,
    /// Route parameters captured by the router
    pub params: HashMap<String, String>,
    /// Set when the byte stream did not start with an HTTP method
    pub mismatched: bool,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Option<String>,
    headers: Headers,
    body: Vec<u8>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            target: None,
            version: None,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the request target; the path and query are derived from it.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.headers.set(key, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let target = self.target.ok_or("target missing")?;
        let (path, query) = split_target(&target);

        Ok(Request {
            method: self.method.ok_or("method missing")?,
            target,
            path,
            query,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            body: self.body,
            params: HashMap::new(),
            mismatched: false,
        })
    }
}

impl Request {
    /// A placeholder request for a byte stream that is not HTTP at all.
    pub(crate) fn mismatched() -> Self {
        Self {
            method: Method::GET,
            target: String::new(),
            path: String::new(),
            query: HashMap::new(),
            version: String::new(),
            headers: Headers::new(),
            body: Vec::new(),
            params: HashMap::new(),
            mismatched: true,
        }
    }

    /// Retrieves a header value by name (case-insensitive).
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Retrieves a route parameter captured by the router.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|v| v.as_str())
    }

    /// Retrieves a decoded query string value.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(|v| v.as_str())
    }

    /// Retrieves the Content-Length header value and parses it as a usize.
    ///
    /// Returns 0 if the header is missing or not a valid number.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn is_mismatched(&self) -> bool {
        self.mismatched
    }

    /// Whether the request version is one the server speaks (`HTTP/1.x`).
    pub fn is_supported_version(&self) -> bool {
        self.version.starts_with("HTTP/1.")
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// A connection is only kept when the client sent a `Connection` header
    /// that is not `close` and the version is not HTTP/1.0. In particular an
    /// HTTP/1.1 request without any `Connection` header is not kept alive.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(value) => {
                !value.eq_ignore_ascii_case("close")
                    && !self.version.eq_ignore_ascii_case("HTTP/1.0")
            }
            None => false,
        }
    }
}

/// Splits a request target into its percent-decoded path and query pairs.
///
/// A fragment, if present, is dropped. A query key without `=` is treated
/// as a boolean flag and maps to `"true"`.
///
/// # Example
///
/// ```
/// # use trellis::http::request::split_target;
/// let (path, query) = split_target("/a%20b?x=1&debug");
/// assert_eq!(path, "/a b");
/// assert_eq!(query.get("x").map(String::as_str), Some("1"));
/// assert_eq!(query.get("debug").map(String::as_str), Some("true"));
/// ```
pub fn split_target(target: &str) -> (String, HashMap<String, String>) {
    let target = target.split('#').next().unwrap_or_default();

    let (raw_path, raw_query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    let path = percent_decode_str(raw_path).decode_utf8_lossy().into_owned();
    let mut query = HashMap::new();

    for token in raw_query.unwrap_or_default().split('&') {
        if token.is_empty() {
            continue;
        }

        if token.contains('=') {
            if let Some((key, value)) = form_urlencoded::parse(token.as_bytes()).next() {
                query.insert(key.into_owned(), value.into_owned());
            }
        } else {
            let key = form_urlencoded::parse(token.as_bytes())
                .next()
                .map(|(key, _)| key.into_owned())
                .unwrap_or_else(|| token.to_string());
            query.insert(key, "true".to_string());
        }
    }

    (path, query)
}
