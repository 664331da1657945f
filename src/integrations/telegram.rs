// src/integrations/telegram.rs — Telegram adapter (Bot API)
//
// Uses the Telegram Bot API (https://core.telegram.org/bots/api).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::infra::errors::TipsError;
use crate::integrations::types::MessagingAdapter;
use crate::util::escape_markdown_v2;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram integration adapter.
pub struct TelegramAdapter {
    client: Client,
    bot_token: String,
    parse_mode: String,
    api_base: String,
}

impl TelegramAdapter {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: Client::new(),
            bot_token,
            parse_mode: "MarkdownV2".into(),
            api_base: TELEGRAM_API_BASE.into(),
        }
    }

    pub fn with_parse_mode(mut self, parse_mode: impl Into<String>) -> Self {
        self.parse_mode = parse_mode.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// Text as it will be sent, escaped for the configured parse mode.
    pub fn format_message(&self, content: &str) -> String {
        if self.parse_mode == "MarkdownV2" {
            escape_markdown_v2(content)
        } else {
            content.to_string()
        }
    }

    /// Validate the bot token by calling getMe.
    pub async fn validate(&self) -> anyhow::Result<String> {
        #[derive(Deserialize)]
        struct BotUser {
            username: Option<String>,
            first_name: Option<String>,
        }

        let resp: TelegramResponse<BotUser> = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await?
            .json()
            .await?;

        if !resp.ok {
            anyhow::bail!(
                "Telegram auth failed: {}",
                resp.description.unwrap_or_else(|| "unknown".into())
            );
        }

        let bot = resp.result.unwrap_or(BotUser {
            username: None,
            first_name: None,
        });
        Ok(format!(
            "Authenticated as @{}",
            bot.username
                .unwrap_or_else(|| bot.first_name.unwrap_or_default())
        ))
    }
}

// -- Telegram API response types --

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct SendMessageResp {
    message_id: i64,
}

#[async_trait]
impl MessagingAdapter for TelegramAdapter {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn send(&self, target: &str, content: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "chat_id": target,
            "text": self.format_message(content),
            "parse_mode": self.parse_mode,
        });

        let resp: TelegramResponse<SendMessageResp> = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !resp.ok {
            return Err(TipsError::Delivery {
                target: target.to_string(),
                message: resp.description.unwrap_or_else(|| "unknown".into()),
            }
            .into());
        }

        Ok(resp
            .result
            .map(|r| r.message_id.to_string())
            .unwrap_or_default())
    }
}
