// ============================================================================
// recall-bot - Telegram webhook server for the personal memory agent
// ============================================================================
// Routes:
//   POST /webhook/{secret}   Telegram updates (403 on wrong secret)
//   GET  /                   Health check
//   GET  /stats              Total memories and popular tags
// ============================================================================

mod config;
mod server;
mod telegram;

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use recall_core::memory::{EmbeddingService, QdrantIndex, VectorIndex};
use recall_core::{AccessGate, Assistant, MemoryDb, RetrievalEngine};

use config::{Config, DEFAULT_WEBHOOK_SECRET};
use server::AppState;
use telegram::{TelegramApi, TelegramClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("recall_bot=debug".parse()?)
                .add_directive("recall_core=debug".parse()?),
        )
        .init();

    info!("Starting Recall - Memory Agent");

    let config = Config::parse();
    config.validate()?;

    if config.webhook_secret == DEFAULT_WEBHOOK_SECRET {
        warn!("WEBHOOK_SECRET is the default value, set a real secret");
    }

    // Durable store, with Qdrant for vector search when configured
    let mut db = MemoryDb::open(config.db_path.as_deref())?;
    if let Some(url) = config.qdrant_url.as_deref() {
        match QdrantIndex::connect(url).await {
            Ok(index) => {
                if index.health_check().await.unwrap_or(false) {
                    info!("Vector search via Qdrant at {}", url);
                    db = db.with_index(Arc::new(index));
                    match db.sync_index().await {
                        Ok(0) => {}
                        Ok(pending) => warn!("{} memories wait for the vector index", pending),
                        Err(e) => warn!("Vector index sync failed: {}", e),
                    }
                } else {
                    warn!("Qdrant at {} is unhealthy, using flat vector search", url);
                }
            }
            Err(e) => warn!("Qdrant unavailable ({}), using flat vector search", e),
        }
    }

    let embedder = EmbeddingService::new_custom(
        config.openai_api_key.clone(),
        config.embedding_base_url.clone(),
        config.embedding_model.clone(),
    );
    info!("Embeddings: {} via {}", embedder.model(), embedder.base_url());

    let engine = RetrievalEngine::new(Arc::new(db), Arc::new(embedder));
    let assistant = Arc::new(Assistant::new(
        engine,
        AccessGate::new(config.admin_telegram_id),
    ));

    let telegram = Arc::new(TelegramClient::new(&config.bot_token));
    let webhook_url = config.webhook_url();
    match telegram.set_webhook(&webhook_url).await {
        Ok(()) => info!("Webhook set to: {}/webhook/***", config.public_url.trim_end_matches('/')),
        Err(e) => error!("Failed to register webhook: {}", e),
    }

    let state = AppState {
        assistant,
        telegram,
        webhook_secret: Arc::from(config.webhook_secret.as_str()),
    };
    let app = server::router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow!("Server error: {}", e))?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
