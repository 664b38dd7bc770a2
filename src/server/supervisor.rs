use std::any::Any;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, warn};

/// One-shot cancellation flag shared between the watchdog and a blocking
/// worker. Workers can poll it or block until it fires.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks the calling thread until the token is cancelled.
    pub fn wait(&self) {
        let (flag, cvar) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(|e| e.into_inner());
        while !*cancelled {
            cancelled = cvar.wait(cancelled).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like [`CancelToken::wait`] but gives up after `timeout`. Returns
    /// whether the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Server-wide stop signal. Once triggered it stays triggered.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolves once the signal has been triggered.
    pub async fn triggered(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so this only errors if it was dropped.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// How a supervised computation ended.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    Panicked(String),
    TimedOut,
    /// The worker was torn down by the runtime; the server is stopping.
    Aborted,
}

/// Runs request computations on blocking worker threads under a time budget.
#[derive(Clone)]
pub struct Supervisor {
    compute_timeout: Duration,
    shutdown: Shutdown,
}

impl Supervisor {
    pub fn new(compute_timeout: Duration, shutdown: Shutdown) -> Self {
        Self {
            compute_timeout,
            shutdown,
        }
    }

    pub fn compute_timeout(&self) -> Duration {
        self.compute_timeout
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Runs `task` on the blocking pool.
    ///
    /// When the budget runs out the task's token is cancelled and its eventual
    /// result is dropped. If the worker is cancelled by the runtime instead of
    /// finishing, the server shutdown signal fires.
    ///
    /// A timed-out task is not stopped: blocking threads cannot be aborted, so a
    /// handler that ignores its token and never returns keeps its thread until
    /// the process exits. Runtimes hosting the server should be shut down with
    /// [`tokio::runtime::Runtime::shutdown_timeout`].
    pub async fn run<T, F>(&self, task: F) -> Outcome<T>
    where
        F: FnOnce(CancelToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        let token = CancelToken::new();
        let worker_token = token.clone();
        let handle = tokio::task::spawn_blocking(move || task(worker_token));

        match tokio::time::timeout(self.compute_timeout, handle).await {
            Ok(Ok(value)) => Outcome::Completed(value),
            Ok(Err(e)) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!(panic = %message, "request worker panicked");
                Outcome::Panicked(message)
            }
            Ok(Err(e)) => {
                error!(error = %e, "request worker cancelled, shutting down");
                self.shutdown.trigger();
                Outcome::Aborted
            }
            Err(_) => {
                warn!(budget_ms = self.compute_timeout.as_millis() as u64, "request exceeded compute budget");
                token.cancel();
                Outcome::TimedOut
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
