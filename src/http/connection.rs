use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::http::encoding;
use crate::http::parser::{read_request, ParseError, ParseLimits};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::static_files::{StaticDir, StaticFiles, StaticResource};
use crate::http::writer::ResponseWriter;
use crate::middleware::{run_chain, ChainError};
use crate::router::Router;
use crate::server::supervisor::{Outcome, Shutdown, Supervisor};
use crate::server::transport::Transport;

/// Methods answered without a route.
const BUILTIN_METHODS: [&str; 4] = ["GET", "HEAD", "TRACE", "OPTIONS"];

/// Upper bound on how long teardown waits for the client to stop sending.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything a connection needs from the server, shared read-only.
pub struct ConnectionContext {
    pub router: Router,
    pub config: Config,
    pub static_files: Option<StaticFiles>,
    pub supervisor: Supervisor,
}

impl ConnectionContext {
    pub fn new(config: Config, router: Router, shutdown: Shutdown) -> Self {
        let static_files = config.static_dir.as_ref().map(|dir| {
            StaticFiles::new(Arc::new(StaticDir::new(dir)))
                .with_buffer_sizes(config.body_buffer_size, config.chunk_size)
        });
        let supervisor = Supervisor::new(config.compute_timeout(), shutdown);

        Self {
            router,
            config,
            static_files,
            supervisor,
        }
    }

    /// Replaces the static content source used for unrouted GET requests.
    pub fn with_static_resource(mut self, resources: Arc<dyn StaticResource>) -> Self {
        self.static_files = Some(
            StaticFiles::new(resources)
                .with_buffer_sizes(self.config.body_buffer_size, self.config.chunk_size),
        );
        self
    }

    fn response(&self, version: &str, remaining: usize, ready: bool) -> Response {
        Response::new(version)
            .with_server_name(self.config.server_name.clone())
            .with_compress_threshold(self.config.compress_threshold)
            .with_keep_alive(remaining, self.config.read_timeout())
            .with_ready(ready)
    }
}

pub enum ConnectionState {
    Parsing,
    Dispatching(Request),
    Responding(Response),
    Closing,
}

/// Serves consecutive requests on one transport.
pub struct Connection<T: Transport> {
    stream: T,
    buffer: BytesMut,
    state: ConnectionState,
    ctx: Arc<ConnectionContext>,
    limits: ParseLimits,
    remaining: usize,
    ready: bool,
}

impl<T: Transport> Connection<T> {
    pub fn new(stream: T, ctx: Arc<ConnectionContext>) -> Self {
        let limits = ctx.config.parse_limits();
        let remaining = ctx.config.max_requests_per_connection;

        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            state: ConnectionState::Parsing,
            ctx,
            limits,
            remaining,
            ready: false,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.ready = match self.stream.handshake().await {
            Ok(ready) => ready,
            Err(e) => {
                debug!(error = %e, "handshake failed");
                self.state = ConnectionState::Closing;
                false
            }
        };

        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closing) {
                ConnectionState::Parsing => {
                    if self.remaining == 0 {
                        continue;
                    }

                    self.state = match read_request(&mut self.stream, &mut self.buffer, &self.limits).await {
                        Ok(None) => ConnectionState::Closing,
                        Ok(Some(req)) if req.is_mismatched() => {
                            debug!("byte stream is not HTTP, closing");
                            ConnectionState::Closing
                        }
                        Ok(Some(req)) => ConnectionState::Dispatching(req),
                        Err(e) => match self.parse_failure(e) {
                            Some(res) => ConnectionState::Responding(res),
                            None => ConnectionState::Closing,
                        },
                    };
                }

                ConnectionState::Dispatching(req) => {
                    let res = self.dispatch(req).await;
                    self.state = ConnectionState::Responding(res);
                }

                ConnectionState::Responding(mut res) => {
                    let mut writer = ResponseWriter::new(res.take_output());
                    if let Err(e) = writer.write_to_stream(&mut self.stream).await {
                        debug!(error = %e, "client went away mid-response");
                        continue;
                    }

                    if !res.is_closing() && self.remaining > 0 && !self.ctx.supervisor.shutdown().is_triggered() {
                        self.state = ConnectionState::Parsing;
                    }
                }

                ConnectionState::Closing => break,
            }
        }

        self.teardown().await;
        Ok(())
    }

    async fn dispatch(&mut self, mut req: Request) -> Response {
        let remaining = self.remaining;
        self.remaining -= 1;

        let version = if req.is_supported_version() {
            req.version.clone()
        } else {
            "HTTP/1.1".to_string()
        };

        let mut res = self
            .ctx
            .response(&version, remaining, self.ready)
            .with_compressor(encoding::negotiate(&req));

        if !req.keep_alive() || self.remaining == 0 {
            res.set_closing(true);
        }

        if !req.is_supported_version() {
            if let Err(e) = res.send_error(StatusCode::HttpVersionNotSupported) {
                debug!(error = %e, "failed to build 505");
            }
            access_log(req.method, &req.path, &res);
            return res;
        }

        if let Some(target) = self.ctx.config.upgrade_insecure.as_deref() {
            if !self.stream.is_secure() {
                res.set_header("Vary", "Upgrade-Insecure-Requests");
                let location = secure_location(target, &req);
                if let Err(e) = res.redirect(&location, true) {
                    debug!(error = %e, "failed to build upgrade redirect");
                }
                access_log(req.method, &req.path, &res);
                return res;
            }
        }

        if req.method == Method::HEAD && !self.ctx.router.has_route(Method::HEAD, &req.path) {
            req.method = Method::GET;
            res.set_discard_body(true);
        }

        let method = req.method;
        let path = req.path.clone();
        let ctx = self.ctx.clone();

        let outcome = self
            .ctx
            .supervisor
            .run(move |cancel| {
                let found = ctx.router.resolve(req.method, &req.path);
                req.params = found.params.clone();

                let result = match &found.handler {
                    Some(handler) => run_chain(&req, &mut res, &found.middleware, handler.as_ref(), &cancel),
                    None => default_method(&ctx, &req, &mut res).map_err(|e| ChainError::Failed(e.into())),
                };

                if let Err(e) = result {
                    warn!(method = %req.method, path = %req.path, error = %e, "handler failed");
                    res.reset();
                    if let Err(e) = res.send_error_with(StatusCode::InternalServerError, &e.to_string()) {
                        debug!(error = %e, "failed to build 500");
                    }
                }

                res
            })
            .await;

        let res = match outcome {
            Outcome::Completed(res) => res,
            Outcome::TimedOut => {
                let mut res = self.ctx.response(&version, remaining, self.ready);
                let retry = self.ctx.supervisor.compute_timeout().as_secs().max(1);
                res.set_header("Retry-After", &retry.to_string());
                if let Err(e) = res.send_error(StatusCode::InternalServerError) {
                    debug!(error = %e, "failed to build 500");
                }
                res
            }
            Outcome::Panicked(_) | Outcome::Aborted => {
                let mut res = self.ctx.response(&version, remaining, self.ready);
                if let Err(e) = res.send_error(StatusCode::InternalServerError) {
                    debug!(error = %e, "failed to build 500");
                }
                res
            }
        };

        access_log(method, &path, &res);
        res
    }

    /// Maps a failed read onto the response the client should see, if any.
    fn parse_failure(&self, e: ParseError) -> Option<Response> {
        let mut res = self.ctx.response("HTTP/1.1", 0, self.ready);
        res.set_closing(true);

        let sent = match &e {
            ParseError::Timeout => {
                debug!("client read timed out");
                let retry = self.ctx.config.read_timeout().as_secs().max(1);
                res.set_header("Retry-After", &retry.to_string());
                res.send_error(StatusCode::RequestTimeout)
            }
            ParseError::UriTooLong(_) => {
                debug!(error = %e, "rejecting request");
                res.send_error(StatusCode::UriTooLong)
            }
            ParseError::Incomplete
            | ParseError::UnexpectedEof
            | ParseError::MalformedRequestLine
            | ParseError::Io(_) => {
                debug!(error = %e, "dropping connection");
                return None;
            }
            _ if self.ready => {
                debug!(error = %e, "rejecting request");
                res.send_error_with(StatusCode::BadRequest, &format!("Invalid request: {e}"))
            }
            _ => return None,
        };

        match sent {
            Ok(()) => {
                info!(status = res.status().as_u16(), error = %e, "request rejected");
                Some(res)
            }
            Err(_) => None,
        }
    }

    /// Half-closes the write side, drains what the client still sends for a
    /// bounded time, then lets the transport drop.
    async fn teardown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "shutdown failed");
            return;
        }

        let stream = &mut self.stream;
        let drain = async {
            let mut scratch = [0u8; 1024];
            loop {
                match stream.read(&mut scratch).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };

        let _ = tokio::time::timeout(DRAIN_TIMEOUT, drain).await;
    }
}

/// Answers requests no route claimed.
fn default_method(ctx: &ConnectionContext, req: &Request, res: &mut Response) -> std::io::Result<()> {
    match req.method {
        Method::GET => match &ctx.static_files {
            Some(files) => files.serve(req, res, &req.path),
            None => res.send_error(StatusCode::NotFound),
        },
        Method::TRACE => trace(req, res),
        method => {
            res.set_header("Allow", &BUILTIN_METHODS.join(","));

            if method == Method::OPTIONS {
                res.set_header("Content-Length", "0");
                res.send_with("", "text/plain", StatusCode::NoContent)
            } else if !BUILTIN_METHODS.contains(&method.as_str()) {
                res.send_with("", "text/plain", StatusCode::MethodNotAllowed)
            } else {
                res.send_with("", "text/plain", StatusCode::NotImplemented)
            }
        }
    }
}

/// Echoes the request line and headers back as `message/http`. The
/// connection is always closed afterwards.
fn trace(req: &Request, res: &mut Response) -> std::io::Result<()> {
    let mut echo = format!("TRACE {} {}\r\n", req.target, req.version);
    for header in &req.headers {
        echo.push_str(&format!("{}: {}\r\n", header.key, header.value));
    }

    res.set_closing(true);
    res.send(echo.as_bytes(), None, "message/http", StatusCode::Ok)
}

fn secure_location(target: &str, req: &Request) -> String {
    let query = req.target.split_once('?').map(|(_, q)| q);

    match Url::parse(&format!("https://{target}")) {
        Ok(mut url) => {
            url.set_path(&req.path);
            url.set_query(query);
            url.to_string()
        }
        Err(_) => match query {
            Some(q) => format!("https://{target}{}?{q}", req.path),
            None => format!("https://{target}{}", req.path),
        },
    }
}

fn access_log(method: Method, path: &str, res: &Response) {
    info!(
        method = %method,
        path = %path,
        status = res.status().as_u16(),
        bytes = res.body_len(),
        "request served"
    );
}
