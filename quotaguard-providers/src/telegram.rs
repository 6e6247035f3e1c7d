use crate::NotificationChannel;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects messages longer than this (UTF-16 units; chars is close enough here).
pub const MAX_MESSAGE_CHARS: usize = 4096;

pub struct TelegramChannel {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramChannel {
    fn http_client() -> Result<Client> {
        Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build Telegram HTTP client")
    }

    pub fn new(token: String, chat_id: String) -> Result<Self> {
        Ok(Self {
            client: Self::http_client()?,
            api_base: API_BASE.to_string(),
            token: token.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
        })
    }

    /// Builds a channel, discovering the recipient from the bot's pending updates
    /// when no chat id is configured. Someone must have messaged the bot first.
    pub async fn connect(token: String, chat_id: Option<String>) -> Result<Self> {
        Self::connect_at(API_BASE, token, chat_id).await
    }

    /// `connect` against another Bot API server (self-hosted `telegram-bot-api`, tests).
    pub async fn connect_at(api_base: &str, token: String, chat_id: Option<String>) -> Result<Self> {
        let api_base = api_base.trim_end_matches('/').to_string();
        let token = token.trim().to_string();
        if let Some(id) = chat_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            return Ok(Self::new(token, id)?.with_api_base(api_base));
        }

        let client = Self::http_client()?;
        let url = format!("{}/bot{}/getUpdates", api_base, token);
        let body: Value = client
            .get(&url)
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("getUpdates returned invalid JSON")?;
        let chat_id = chat_id_from_updates(&body)?;
        tracing::info!("resolved Telegram chat_id from bot updates");
        Ok(Self {
            client,
            api_base,
            token,
            chat_id,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn chat_id_json(&self) -> Value {
        self.chat_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(self.chat_id.clone()))
    }

    async fn send_part(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = json!({ "chat_id": self.chat_id_json(), "text": text });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("sendMessage request failed")?;
        let status = resp.status();
        let payload: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() || payload["ok"].as_bool() != Some(true) {
            return Err(anyhow::anyhow!(
                "Telegram sendMessage failed: status={} description={}",
                status.as_u16(),
                payload["description"].as_str().unwrap_or("")
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn code(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<()> {
        for part in split_message(text, MAX_MESSAGE_CHARS) {
            self.send_part(&part).await?;
        }
        Ok(())
    }
}

/// Reads the chat id of the first update, as sent by whoever messaged the bot.
fn chat_id_from_updates(body: &Value) -> Result<String> {
    if body["ok"].as_bool() != Some(true) {
        return Err(anyhow::anyhow!(
            "Telegram getUpdates failed: {}",
            body["description"].as_str().unwrap_or("unknown error")
        ));
    }
    let first = body["result"]
        .as_array()
        .and_then(|updates| updates.first())
        .ok_or_else(|| {
            anyhow::anyhow!("can't get the Telegram bot chat_id, please send a message to that bot")
        })?;

    ["message", "edited_message", "channel_post"]
        .iter()
        .find_map(|key| match &first[*key]["chat"]["id"] {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .ok_or_else(|| anyhow::anyhow!("first Telegram update carries no chat id"))
}

/// Splits on line boundaries so each part fits the API limit.
/// A single line longer than the limit is hard-split.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for chunk in chars.chunks(limit) {
                parts.push(chunk.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
