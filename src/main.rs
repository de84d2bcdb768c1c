use std::sync::Arc;

use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

use delivery_desk::api;
use delivery_desk::config::{Config, LogFormat};
use delivery_desk::error::AppError;
use delivery_desk::observability::metrics::Metrics;
use delivery_desk::realtime::local::LocalChannel;
use delivery_desk::realtime::ws_channel::WsChannel;
use delivery_desk::realtime::{run_bridge, RealtimeChannel};
use delivery_desk::session::SessionStore;
use delivery_desk::state::AppState;
use delivery_desk::upstream::ApiClient;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let metrics = Metrics::new();
    let session = Arc::new(SessionStore::open(&config.session_path)?);
    let client = ApiClient::new(
        &config.api_base_url,
        config.request_timeout,
        session,
        metrics.clone(),
    )?;

    let channel: Arc<dyn RealtimeChannel> = match &config.realtime_url {
        Some(url) => {
            tracing::info!(url = %url, "using platform realtime channel");
            Arc::new(WsChannel::connect(url.clone(), config.event_buffer_size))
        }
        None => {
            tracing::info!("REALTIME_URL not set; using local loopback channel");
            Arc::new(LocalChannel::new(config.event_buffer_size))
        }
    };

    let (app_state, rooms_rx) = AppState::new(
        client,
        channel.clone(),
        metrics,
        config.poll_interval,
        config.event_buffer_size,
    );
    let shared_state = Arc::new(app_state);

    tokio::spawn(run_bridge(shared_state.board.clone(), channel, rooms_rx));
    shared_state.start_polling();

    let app = api::rest::router(shared_state.clone())
        .fallback_service(ServeDir::new(&config.static_dir));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        api_base_url = %config.api_base_url,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    shared_state.poller.stop_all();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
