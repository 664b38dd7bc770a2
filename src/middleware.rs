//! Middleware and the chain runner.
//!
//! Middleware run in registration order before a route's handler. Each one
//! receives a fresh [`Next`] and must call [`Next::proceed`] to let the chain
//! continue. A middleware that returns without proceeding parks the chain
//! until the request's compute budget cancels it.

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;

use crate::http::request::Request;
use crate::http::response::Response;
use crate::router::Handler;
use crate::server::supervisor::CancelToken;

pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: &Request, res: &mut Response, next: &mut Next) -> anyhow::Result<()>;
}

impl<F> Middleware for F
where
    F: Fn(&Request, &mut Response, &mut Next) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, req: &Request, res: &mut Response, next: &mut Next) -> anyhow::Result<()> {
        self(req, res, next)
    }
}

/// Wraps a closure as a shareable middleware.
///
/// # Example
///
/// ```
/// use trellis::middleware::from_fn;
///
/// let stamp = from_fn(|_req, res, next| {
///     res.set_header("X-Stamp", "1");
///     next.proceed();
///     Ok(())
/// });
/// # let _ = stamp;
/// ```
pub fn from_fn(
    f: impl Fn(&Request, &mut Response, &mut Next) -> anyhow::Result<()> + Send + Sync + 'static,
) -> Arc<dyn Middleware> {
    Arc::new(f)
}

/// Continuation handed to a single middleware invocation.
#[derive(Debug, Default)]
pub struct Next {
    proceeded: bool,
}

impl Next {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the chain advance. Calling it more than once has no further
    /// effect.
    pub fn proceed(&mut self) {
        self.proceeded = true;
    }

    pub fn called(&self) -> bool {
        self.proceeded
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("middleware chain interrupted before reaching the handler")]
    Interrupted,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Runs `middleware` in order, then `handler`.
///
/// Stops with `ChainError::Interrupted` once `cancel` fires, either because a
/// middleware never proceeded or because the budget ran out between steps.
pub fn run_chain(
    req: &Request,
    res: &mut Response,
    middleware: &[Arc<dyn Middleware>],
    handler: &dyn Handler,
    cancel: &CancelToken,
) -> Result<(), ChainError> {
    let mut queue: VecDeque<Arc<dyn Middleware>> = middleware.iter().cloned().collect();

    while let Some(current) = queue.front().cloned() {
        if cancel.is_cancelled() {
            return Err(ChainError::Interrupted);
        }

        let mut next = Next::new();
        current.handle(req, res, &mut next)?;

        if !next.called() {
            cancel.wait();
            return Err(ChainError::Interrupted);
        }

        queue.pop_front();
    }

    if cancel.is_cancelled() {
        return Err(ChainError::Interrupted);
    }

    handler.handle(req, res)?;
    Ok(())
}
