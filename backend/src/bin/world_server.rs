//! World Server
//!
//! The conversational backend the gateway connects to. Serves
//! `/websocket`, runs the Overworld/TaskWorld state machine per connection,
//! and answers with a Gemini model when `GEMINI_API_KEY` is set, otherwise
//! with a local echo agent.

use chat_bridge::config::WorldConfig;
use chat_bridge::world::server::{router, WorldServerState};
use chat_bridge::world::{Agent, AgentFactory, EchoAgent, GeminiAgent, GeminiSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = WorldConfig::from_env();
    info!("Configuration loaded: {:?}", config);

    let factory: Arc<dyn AgentFactory> = match GeminiSettings::from_config(&config)? {
        Some(settings) => {
            info!(model = %config.gemini_model, "Using Gemini agent");
            Arc::new(move || Box::new(GeminiAgent::new(settings.clone())) as Box<dyn Agent>)
        }
        None => {
            info!("GEMINI_API_KEY not set, using echo agent");
            Arc::new(|| Box::new(EchoAgent::new()) as Box<dyn Agent>)
        }
    };

    let app = router(WorldServerState { factory }).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    info!("World server listening on ws://{}/websocket", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        })
        .await?;

    Ok(())
}
