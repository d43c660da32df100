//! Recall API server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use recall::config::{string_from_env, u64_from_env};
use recall::rerank::RerankConfig;
use recall::vespa::{IndexClient, VespaClient};
use recall::{Config, EmbedConfig, SearchConfig, SearchEngine};

use recall_server::api::middleware::CorsConfig;
use recall_server::api::auth::AuthConfig;
use recall_server::{AppState, ChatConfig, ChatService, LlmClient, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let auth_config = AuthConfig::from_env()?;
    let cors_config = CorsConfig::from_env();
    let embed_config = EmbedConfig::from_env()?;
    let search_config = SearchConfig::from_env();
    let rerank_config = RerankConfig::from_env();
    let chat_config = ChatConfig::from_env();

    let bind_addr = string_from_env("API_BIND_ADDR", "0.0.0.0".to_string());
    let port = u64_from_env("API_PORT", 8000) as u16;
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    let index: Arc<dyn IndexClient> = Arc::new(VespaClient::new(&config.vespa_endpoint, 500));
    let query_embedder = embed_config.build_provider()?;

    let engine = Arc::new(SearchEngine::new(
        index,
        query_embedder,
        search_config,
        &rerank_config,
    ));

    let llm = if chat_config.llm_stub {
        tracing::warn!("LLM stub mode enabled, answers are canned");
        LlmClient::Stub
    } else {
        LlmClient::genai()
    };
    let chat = Arc::new(ChatService::new(engine.clone(), llm, chat_config));

    let state = AppState::new(engine, chat, auth_config);
    let app = create_router(state, &cors_config);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
