//! Runtime configuration: flags with environment fallbacks (`.env` is
//! loaded first).

use anyhow::{bail, Result};
use clap::Parser;

use recall_core::memory::{DEFAULT_EMBEDDING_BASE_URL, DEFAULT_EMBEDDING_MODEL};
use recall_core::UserId;

/// Placeholder secret that should never reach production
pub const DEFAULT_WEBHOOK_SECRET: &str = "change-me";

#[derive(Parser, Debug, Clone)]
#[command(name = "recall-bot", version, about = "Personal memory agent behind a Telegram webhook")]
pub struct Config {
    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// Public base URL Telegram can reach (webhook is registered under it)
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: String,

    /// The only Telegram user allowed to talk to the bot
    #[arg(long, env = "ADMIN_TELEGRAM_ID")]
    pub admin_telegram_id: UserId,

    /// API key for the embedding provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// Shared secret path segment of the webhook URL
    #[arg(long, env = "WEBHOOK_SECRET", default_value = DEFAULT_WEBHOOK_SECRET, hide_env_values = true)]
    pub webhook_secret: String,

    /// Database file (default: ~/.recall/memories.redb)
    #[arg(long, env = "RECALL_DB_PATH")]
    pub db_path: Option<String>,

    /// Qdrant gRPC URL; without it vector search scans the database
    #[arg(long, env = "QDRANT_URL")]
    pub qdrant_url: Option<String>,

    #[arg(long, env = "EMBEDDING_BASE_URL", default_value = DEFAULT_EMBEDDING_BASE_URL)]
    pub embedding_base_url: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,
}

impl Config {
    /// Reject configurations the bot cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.bot_token.trim().is_empty() {
            missing.push("BOT_TOKEN");
        }
        if self.public_url.trim().is_empty() {
            missing.push("PUBLIC_URL");
        }
        if self.openai_api_key.trim().is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        if self.admin_telegram_id == 0 {
            missing.push("ADMIN_TELEGRAM_ID");
        }
        if self.webhook_secret.trim().is_empty() {
            missing.push("WEBHOOK_SECRET");
        }

        if !missing.is_empty() {
            bail!("Missing required settings: {}", missing.join(", "));
        }
        Ok(())
    }

    pub fn webhook_url(&self) -> String {
        format!(
            "{}/webhook/{}",
            self.public_url.trim_end_matches('/'),
            self.webhook_secret
        )
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
