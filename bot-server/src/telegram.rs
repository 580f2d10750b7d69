//! ============================================================================
//! Telegram Transport - Bot API updates in, replies out
//! ============================================================================
//! Decodes webhook updates, reduces them to `InboundEvent`s and delivers
//! `Reply`s through the Bot API:
//! - Text messages → `EventKind::Text`
//! - Callback queries (inline buttons) → `EventKind::Button`
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use recall_core::conversation::{Markup, CANCEL_MENU_ROWS, MAIN_MENU_ROWS};
use recall_core::{InboundEvent, Reply};

/// Telegram Bot API base URL
const TELEGRAM_API: &str = "https://api.telegram.org";

// ============================================================================
// Update decoding
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

/// An update reduced to what the conversation needs, plus where to answer
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    pub event: InboundEvent,
    pub chat_id: i64,
    /// Message the pressed button belongs to (edit target)
    pub origin_message_id: Option<i64>,
}

impl Update {
    /// Id of the callback query to acknowledge, if this update carries one
    pub fn callback_id(&self) -> Option<&str> {
        self.callback_query.as_ref().map(|q| q.id.as_str())
    }

    /// Reduce to an inbound event. Updates without text or button data
    /// (stickers, edits, buttons on vanished messages) yield `None`.
    pub fn into_incoming(self) -> Option<Incoming> {
        if let Some(query) = self.callback_query {
            let message = query.message?;
            let data = query.data?;
            return Some(Incoming {
                event: InboundEvent::button(query.from.id, data),
                chat_id: message.chat.id,
                origin_message_id: Some(message.message_id),
            });
        }

        let message = self.message?;
        let text = message.text?;
        let identity = message.from.as_ref().map_or(message.chat.id, |u| u.id);
        Some(Incoming {
            event: InboundEvent::text(identity, text),
            chat_id: message.chat.id,
            origin_message_id: None,
        })
    }
}

// ============================================================================
// Reply markup
// ============================================================================

fn keyboard(rows: &[&[&str]]) -> Value {
    let rows: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
        .collect();
    json!({ "keyboard": rows, "resize_keyboard": true })
}

/// Bot API `reply_markup` for a reply, if it has one
pub fn reply_markup(markup: &Markup) -> Option<Value> {
    match markup {
        Markup::MainMenu => Some(keyboard(&MAIN_MENU_ROWS)),
        Markup::CancelMenu => Some(keyboard(&CANCEL_MENU_ROWS)),
        Markup::Inline(rows) => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| json!({ "text": b.label, "callback_data": b.payload }))
                        .collect()
                })
                .collect();
            Some(json!({ "inline_keyboard": rows }))
        }
        Markup::None => None,
    }
}

// ============================================================================
// Bot API client
// ============================================================================

/// Outgoing side of the Bot API used by the webhook handler
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn send_message(&self, chat_id: i64, reply: &Reply) -> Result<()>;

    async fn edit_message(&self, chat_id: i64, message_id: i64, reply: &Reply) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str) -> Result<()>;

    async fn set_webhook(&self, url: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// `reqwest` implementation of the Bot API
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/bot{}", TELEGRAM_API, bot_token),
        }
    }

    async fn call(&self, method: &str, body: Value) -> Result<()> {
        let url = format!("{}/{}", self.base_url, method);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to call Telegram {}: {}", method, e))?;

        let status = response.status();
        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse Telegram {} response: {}", method, e))?;

        if !status.is_success() || !parsed.ok {
            return Err(anyhow!(
                "Telegram API error {} on {}: {}",
                status,
                method,
                parsed.description.unwrap_or_default()
            ));
        }

        debug!("Telegram {} ok", method);
        Ok(())
    }
}

#[async_trait]
impl TelegramApi for TelegramClient {
    async fn send_message(&self, chat_id: i64, reply: &Reply) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": reply.text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(markup) = reply_markup(&reply.markup) {
            body["reply_markup"] = markup;
        }
        self.call("sendMessage", body).await
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, reply: &Reply) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": reply.text,
            "parse_mode": "HTML",
        });
        // Edited messages only accept inline keyboards
        if matches!(reply.markup, Markup::Inline(_)) {
            if let Some(markup) = reply_markup(&reply.markup) {
                body["reply_markup"] = markup;
            }
        }
        self.call("editMessageText", body).await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.call("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
            .await
    }

    async fn set_webhook(&self, url: &str) -> Result<()> {
        self.call("setWebhook", json!({ "url": url })).await?;
        info!("Webhook registered");
        Ok(())
    }
}

/// Send one reply, editing the originating message when asked to. A failed
/// edit (message too old, text unchanged) falls back to a new message.
pub async fn deliver(
    api: &dyn TelegramApi,
    chat_id: i64,
    origin_message_id: Option<i64>,
    reply: &Reply,
) -> Result<()> {
    if let (true, Some(message_id)) = (reply.edit, origin_message_id) {
        match api.edit_message(chat_id, message_id, reply).await {
            Ok(()) => return Ok(()),
            Err(e) => warn!("Edit failed ({}), sending a new message", e),
        }
    }
    api.send_message(chat_id, reply).await
}
