//! Request routing.
//!
//! Routes are registered per method against `/`-separated patterns and stored
//! in a [`trie::Trie`]. A pattern segment is one of:
//!
//! - a literal (`about`), matched by equality
//! - a parameter (`:id`), optionally constrained by a regex (`:id(^\d+$)`)
//! - a glob (`wild*card`, `*`), which also captures the rest of the path
//!   under the `wildcard` parameter
//! - a raw regex (`^v[0-9]+$`), matched anywhere in the segment
//!
//! # Example
//!
//! ```
//! use trellis::http::request::Method;
//! use trellis::router::Router;
//!
//! let mut router = Router::new();
//! router.get("/users/:id", |req, res| {
//!     let id = req.param("id").unwrap_or_default();
//!     res.send_text(id)?;
//!     Ok(())
//! });
//!
//! let found = router.resolve(Method::GET, "/users/7");
//! assert!(found.is_found());
//! assert_eq!(found.params.get("id").map(String::as_str), Some("7"));
//! ```

pub mod trie;

use std::collections::HashMap;
use std::sync::Arc;

use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::middleware::Middleware;

pub use trie::{Trie, WILDCARD_PARAM};

/// Terminal request handler.
///
/// Handlers run on a blocking worker thread and write their reply into the
/// response. Returning an error turns into a 500 carrying the error message.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: &Request, res: &mut Response) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, req: &Request, res: &mut Response) -> anyhow::Result<()> {
        self(req, res)
    }
}

/// Outcome of a route lookup. A missing handler means no route matched.
#[derive(Clone, Default)]
pub struct HandlerResult {
    pub handler: Option<Arc<dyn Handler>>,
    pub params: HashMap<String, String>,
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl HandlerResult {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn is_found(&self) -> bool {
        self.handler.is_some()
    }
}

impl std::fmt::Debug for HandlerResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerResult")
            .field("found", &self.is_found())
            .field("params", &self.params)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Route registration facade over the trie.
#[derive(Default)]
pub struct Router {
    trie: Trie,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::GET, pattern, None, handler)
    }

    pub fn post(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::POST, pattern, None, handler)
    }

    pub fn put(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::PUT, pattern, None, handler)
    }

    pub fn delete(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::DELETE, pattern, None, handler)
    }

    pub fn options(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::OPTIONS, pattern, None, handler)
    }

    pub fn get_with(
        &mut self,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::GET, pattern, Some(middleware), handler)
    }

    pub fn post_with(
        &mut self,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::POST, pattern, Some(middleware), handler)
    }

    pub fn put_with(
        &mut self,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::PUT, pattern, Some(middleware), handler)
    }

    pub fn delete_with(
        &mut self,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::DELETE, pattern, Some(middleware), handler)
    }

    pub fn options_with(
        &mut self,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route(Method::OPTIONS, pattern, Some(middleware), handler)
    }

    /// Registers `handler` for any method. Passing `None` for middleware
    /// keeps whatever an earlier registration of the same route attached.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        middleware: Option<Vec<Arc<dyn Middleware>>>,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.route_handler(method, pattern, middleware, Arc::new(handler))
    }

    /// Registers an already shared handler.
    pub fn route_handler(
        &mut self,
        method: Method,
        pattern: &str,
        middleware: Option<Vec<Arc<dyn Middleware>>>,
        handler: Arc<dyn Handler>,
    ) -> &mut Self {
        self.trie.register(method, pattern, middleware, handler);
        self
    }

    pub fn resolve(&self, method: Method, path: &str) -> HandlerResult {
        self.trie.resolve(method, path)
    }

    /// Whether any route answers `method` at `path`.
    pub fn has_route(&self, method: Method, path: &str) -> bool {
        self.resolve(method, path).is_found()
    }

    pub fn trie(&self) -> &Trie {
        &self.trie
    }
}
