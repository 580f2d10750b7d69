//! HTTP surface: Telegram webhook, health check and stats.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use recall_core::conversation::render::TAG_HINT_COUNT;
use recall_core::Assistant;

use crate::telegram::{deliver, TelegramApi, Update};

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    pub telegram: Arc<dyn TelegramApi>,
    pub webhook_secret: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/stats", get(stats))
        .route("/webhook/{secret}", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "bot": "Memory Agent" }))
}

async fn stats(State(state): State<AppState>) -> Response {
    match state.assistant.engine().stats(TAG_HINT_COUNT).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!("Stats unavailable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "storage unavailable" })),
            )
                .into_response()
        }
    }
}

async fn webhook(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    body: Bytes,
) -> Response {
    if secret != *state.webhook_secret {
        warn!("Rejected webhook call with wrong secret");
        return (StatusCode::FORBIDDEN, Json(json!({ "detail": "Forbidden" }))).into_response();
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Malformed update: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "detail": "Malformed update" })))
                .into_response();
        }
    };

    process_update(&state, update).await;
    Json(json!({ "ok": true })).into_response()
}

/// Acknowledge, run through the assistant, deliver the replies
pub async fn process_update(state: &AppState, update: Update) {
    debug!("Processing update {}", update.update_id);

    if let Some(callback_id) = update.callback_id() {
        if let Err(e) = state.telegram.answer_callback(callback_id).await {
            warn!("Failed to answer callback query: {}", e);
        }
    }

    let Some(incoming) = update.into_incoming() else {
        debug!("Ignoring update without text or button data");
        return;
    };

    let replies = state.assistant.handle(incoming.event).await;
    for reply in &replies {
        if let Err(e) = deliver(
            state.telegram.as_ref(),
            incoming.chat_id,
            incoming.origin_message_id,
            reply,
        )
        .await
        {
            error!("Failed to deliver reply to chat {}: {}", incoming.chat_id, e);
        }
    }
}
