use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::http::connection::{Connection, ConnectionContext};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::static_files::StaticResource;
use crate::middleware::Middleware;
use crate::router::Router;
use crate::server::pool::{Admission, WorkerPool};
use crate::server::supervisor::Shutdown;

/// An HTTP server: routes are registered up front, then [`Server::serve`]
/// freezes them and starts accepting.
///
/// # Example
///
/// ```no_run
/// use trellis::config::Config;
/// use trellis::server::listener::Server;
///
/// # async fn run() -> anyhow::Result<()> {
/// let mut server = Server::new(Config::default());
/// server.get("/", |_req, res| {
///     res.send_text("root")?;
///     Ok(())
/// });
/// server.run().await
/// # }
/// ```
pub struct Server {
    config: Config,
    router: Router,
    static_resource: Option<Arc<dyn StaticResource>>,
    shutdown: Shutdown,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            router: Router::new(),
            static_resource: None,
            shutdown: Shutdown::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Handle that stops the accept loop when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn get(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.get(pattern, handler);
        self
    }

    pub fn post(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.post(pattern, handler);
        self
    }

    pub fn put(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.put(pattern, handler);
        self
    }

    pub fn delete(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.delete(pattern, handler);
        self
    }

    pub fn options(
        &mut self,
        pattern: &str,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.options(pattern, handler);
        self
    }

    pub fn get_with(
        &mut self,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.get_with(pattern, middleware, handler);
        self
    }

    pub fn post_with(
        &mut self,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.post_with(pattern, middleware, handler);
        self
    }

    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        middleware: Option<Vec<Arc<dyn Middleware>>>,
        handler: impl Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.route(method, pattern, middleware, handler);
        self
    }

    /// Serves unrouted GET requests from `dir`.
    pub fn static_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.config.static_dir = Some(dir.into());
        self
    }

    /// Serves unrouted GET requests from a custom resource provider.
    pub fn static_resource(&mut self, resource: Arc<dyn StaticResource>) -> &mut Self {
        self.static_resource = Some(resource);
        self
    }

    /// Freezes the routes into the context every connection shares.
    pub fn into_context(self) -> (Arc<ConnectionContext>, Shutdown) {
        let mut ctx = ConnectionContext::new(self.config, self.router, self.shutdown.clone());
        if let Some(resource) = self.static_resource {
            ctx = ctx.with_static_resource(resource);
        }
        (Arc::new(ctx), self.shutdown)
    }

    /// Binds `listen_addr` from the config and serves until shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until the shutdown
    /// signal fires. Dropping the listener on return closes the socket.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let pool = WorkerPool::new(
            self.config.core_pool_size,
            self.config.max_pool_size,
            self.config.backlog,
        );
        let (ctx, shutdown) = self.into_context();

        info!("Listening on {}", local_addr(&listener));

        loop {
            let (socket, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = shutdown.triggered() => {
                    info!("Shutdown signal received, closing listener");
                    break;
                }
            };

            if let Err(e) = socket.set_nodelay(true) {
                error!("Failed to set TCP_NODELAY for {}: {}", peer, e);
            }
            info!("Accepted connection from {}", peer);

            let ctx = ctx.clone();
            let admission = pool
                .submit(async move {
                    let mut conn = Connection::new(socket, ctx);
                    if let Err(e) = conn.run().await {
                        error!("Connection error from {}: {}", peer, e);
                    }
                })
                .await;

            if admission == Admission::CallerRuns {
                info!("Served {} on the accept loop, pool saturated", peer);
            }
        }

        Ok(())
    }
}

fn local_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|addr: SocketAddr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}
