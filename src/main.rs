use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use bookclub::{config, config::AppConfig, db, middleware::EndpointRateLimiter, routes, state::AppState};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LIMITER_SWEEP: Duration = Duration::from_secs(300);

/// Console output plus `logs/bookclub.log`, rotated daily. The returned guards
/// must live until exit or buffered lines are lost.
fn init_logging() -> [WorkerGuard; 2] {
    if let Err(e) = std::fs::create_dir_all("logs") {
        eprintln!("cannot create logs directory: {}", e);
    }
    let (console, console_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (file, file_guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily("logs", "bookclub.log"));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(console))
        .with(fmt::layer().with_ansi(false).with_writer(file))
        .init();

    [console_guard, file_guard]
}

async fn prepare_upload_dirs(cfg: &AppConfig) -> std::io::Result<()> {
    let root = Path::new(&cfg.uploads.dir);
    tokio::fs::create_dir_all(root.join("books")).await
}

fn spawn_limiter_sweep(limiter: EndpointRateLimiter) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_SWEEP);
        loop {
            ticker.tick().await;
            limiter.cleanup_all().await;
        }
    });
}

fn listen_addr(cfg: &AppConfig) -> anyhow::Result<SocketAddr> {
    let raw = format!("{}:{}", cfg.server.host, cfg.server.port);
    raw.parse().map_err(|e| anyhow::anyhow!("invalid listen address {}: {}", raw, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guards = init_logging();

    let cfg = config::load()?;
    config::ensure_sqlite_parent_dir(&cfg.database.url)?;

    let pool = db::connect(&cfg.database.url).await?;
    db::init_db(&pool).await?;
    prepare_upload_dirs(&cfg).await?;

    let addr = listen_addr(&cfg)?;
    let state = AppState::new(pool, cfg);
    spawn_limiter_sweep(state.rate_limiter.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Bookclub API listening on http://{}", listener.local_addr()?);

    let app = routes::router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl-C handler failed: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
}
