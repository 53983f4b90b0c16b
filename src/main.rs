use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use url_checker::config;
use url_checker::db;
use url_checker::handlers::{self, AppState};
use url_checker::probe::HttpProber;
use url_checker::{Checker, Lifecycle, PdfRenderer, ReportBuilder, ReportQueue};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print an example config and exit
    #[arg(long)]
    example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.example_config {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.app.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let lifecycle = Lifecycle::new();
    let prober = HttpProber::from_config(&cfg)?;
    let checker = Arc::new(Checker::new(pool.clone(), Arc::new(prober), lifecycle.clone()));
    checker.load_batches().await?;

    // Single report worker; stopped by `shutdown` after the server drains.
    let builder = ReportBuilder::new(pool.clone(), Arc::new(PdfRenderer));
    let (reports, worker) = ReportQueue::new(
        cfg.report.queue_capacity,
        cfg.report.wait_timeout(),
        builder,
        lifecycle.clone(),
    );
    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let app = handlers::router(AppState { checker, reports });
    let listener = TcpListener::bind(&cfg.app.listen_addr).await?;
    info!(addr = %cfg.app.listen_addr, "starting server");

    let drain = CancellationToken::new();
    let server = {
        let drain = drain.clone();
        axum::serve(listener, app).with_graceful_shutdown(async move { drain.cancelled().await })
    };
    let server_handle = tokio::spawn(async move { server.await });

    wait_for_signal().await;
    info!("shutdown signal received, starting graceful shutdown");
    lifecycle.set_shutdown(true);
    drain.cancel();

    match tokio::time::timeout(cfg.app.shutdown_grace(), server_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => error!(?err, "server error"),
        Ok(Err(err)) => error!(?err, "server task failed"),
        Err(_) => warn!("server did not drain within the grace period"),
    }

    shutdown.cancel();
    if let Err(err) = worker_handle.await {
        error!(?err, "report worker task failed");
    }

    info!("graceful shutdown completed");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(?err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
