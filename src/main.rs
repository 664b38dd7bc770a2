use std::time::Duration;

use trellis::config::Config;
use trellis::http::response::StatusCode;
use trellis::middleware::from_fn;
use trellis::server::listener::Server;

/// Grace period for blocking workers still running when the server stops.
const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(serve(cfg));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    let mut server = Server::new(cfg);

    server
        .get("/", |_req, res| {
            res.send_text("root")?;
            Ok(())
        })
        .get("/about", |_req, res| {
            res.send_text("about")?;
            Ok(())
        })
        .get(r"/about/employee/:id(^\d+$)", |req, res| {
            let id = req.param("id").unwrap_or_default();
            res.json(&format!("{{\"employee\": {id}}}"), StatusCode::Ok)?;
            Ok(())
        })
        .get("/files/*", |req, res| {
            let rest = req.param("wildcard").unwrap_or("/");
            res.send_text(&format!("you asked for {rest}"))?;
            Ok(())
        })
        .get_with(
            "/private",
            vec![from_fn(|req, res, next| {
                if req.header("Authorization").is_some() {
                    next.proceed();
                } else {
                    res.send_error(StatusCode::Unauthorized)?;
                    next.proceed();
                }
                Ok(())
            })],
            |_req, res| {
                if !res.headers_sent() {
                    res.send_text("secret")?;
                }
                Ok(())
            },
        );

    let shutdown = server.shutdown_handle();

    tokio::select! {
        res = server.run() => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
        }
    }

    Ok(())
}
