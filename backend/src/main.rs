//! Chat Bridge Gateway
//!
//! Serves the synchronous chat API and relays every utterance over one
//! WebSocket connection to the conversational backend. The process lives as
//! long as that connection does.

use axum::{extract::Request, middleware::Next, response::Response};
use chat_bridge::api;
use chat_bridge::auth::TokenIssuer;
use chat_bridge::chat::{Bridge, DuplexChannel};
use chat_bridge::config::Config;
use chat_bridge::gateway::Gateway;
use chat_bridge::store::{SessionStore, UserDb};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    info!("Configuration loaded: {:?}", config);

    let users = Arc::new(UserDb::new(&config.persistence.database_path).await?);
    let store: Arc<dyn SessionStore> = users.clone();

    // One backend connection for the whole process
    let (channel, inbound) = DuplexChannel::connect(&config.backend.url).await?;
    let channel = Arc::new(channel);
    let bridge = Arc::new(Bridge::new(channel.clone(), inbound, config.bridge_timeout()));

    let tokens = TokenIssuer::new(&config.auth.jwt_secret, config.token_ttl());
    let gateway = Arc::new(Gateway::new(store, users, bridge, tokens));

    let app = api::router(gateway)
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    info!("Gateway running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(channel.clone()))
        .await?;

    channel.close();
    info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C, SIGTERM, or loss of the backend connection
async fn shutdown_signal(channel: Arc<DuplexChannel>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
        _ = channel.closed() => {
            info!("Backend connection closed, shutting down...");
        },
    }
}
