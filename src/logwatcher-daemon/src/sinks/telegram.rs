//! Telegram sink — Bot API `sendMessage` delivery.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::TelegramChannelConfig;
use crate::sinks::SINK_TIMEOUT;

#[derive(Serialize)]
struct TelegramPayload<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'a str,
}

pub struct TelegramSink {
    config: TelegramChannelConfig,
    client: reqwest::Client,
}

impl TelegramSink {
    pub fn new(config: TelegramChannelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SINK_TIMEOUT)
            .build()
            .context("failed to build telegram http client")?;
        Ok(Self { config, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.config.bot_token)
    }

    pub async fn deliver(&self, message: &str) -> Result<()> {
        let payload = TelegramPayload {
            chat_id: &self.config.chat_id,
            text: format!("\u{1F6A8} *LogWatcher Alert*\n\n{message}"),
            parse_mode: "Markdown",
        };
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .context("telegram request failed")?;
        response
            .error_for_status()
            .context("telegram returned an error status")?;
        Ok(())
    }

    pub async fn self_check(&self) -> bool {
        self.client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map(|r| r.error_for_status().is_ok())
            .unwrap_or(false)
    }

    pub async fn close(&self) {}
}
