use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use webscout_tools::antidetect::AntiDetectState;
use webscout_tools::auth::NoopTokenVerifier;
use webscout_tools::config::AppConfig;
use webscout_tools::dispatcher::AppState;
use webscout_tools::fetcher::{HttpFetcher, ReqwestFetcher};
use webscout_tools::logging;
use webscout_tools::rate_limiter::RateLimiter;
use webscout_tools::rest;
use webscout_tools::robots::{ReqwestRobotsFetcher, RobotsCache};
use webscout_tools::session::{open_default, Housekeeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let config = AppConfig::from_env();

    tracing::info!(event = "startup", storage_root = %config.storage_root.display(), bind_addr = %config.bind_addr);
    if config.log_sink_url.is_some() {
        tracing::info!(
            event = "log_sink_configured",
            operation = "startup",
            "SCRAPE_LOG_SINK_URL is set but no remote LogSink is bundled; wire a concrete LogSink into logging::BufferedSink to use it"
        );
    }

    let antidetect = Arc::new(AntiDetectState::new());
    let robots = Arc::new(RobotsCache::new(ReqwestRobotsFetcher::new(reqwest::Client::new())));
    let rate_limiter = Arc::new(RateLimiter::new());
    let fetcher = Arc::new(HttpFetcher::new(ReqwestFetcher::new(), robots, rate_limiter, antidetect.clone()));
    let session_store = open_default(&config).await?;
    let housekeeper_alive = Arc::new(AtomicBool::new(true));

    let state = Arc::new(AppState {
        antidetect,
        fetcher,
        session_store: session_store.clone(),
        token_verifier: Arc::new(NoopTokenVerifier),
        housekeeper_alive: housekeeper_alive.clone(),
    });

    let cancel = CancellationToken::new();
    let housekeeper = Housekeeper::new(session_store, &config);
    let housekeeper_cancel = cancel.clone();
    let interval = std::time::Duration::from_secs(config.housekeeper_interval_minutes.max(1) * 60);
    let housekeeper_task = tokio::spawn(async move {
        housekeeper.run(interval, housekeeper_cancel).await;
        // `run` only returns on cancellation or an unrecoverable panic unwind
        // point never reached here, so clearing this on exit is unambiguous.
        housekeeper_alive.store(false, Ordering::Relaxed);
    });

    let app = rest::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(event = "listening", bind_addr = %config.bind_addr);

    let shutdown = async {
        let ctrl_c = async { tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler") };
        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    cancel.cancel();
    let _ = housekeeper_task.await;
    Ok(())
}
