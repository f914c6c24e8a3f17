//! Slack sink — incoming webhook delivery.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::WebhookChannelConfig;
use crate::sinks::SINK_TIMEOUT;

#[derive(Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
    username: &'a str,
    icon_emoji: &'a str,
}

pub struct SlackSink {
    config: WebhookChannelConfig,
    client: reqwest::Client,
}

impl SlackSink {
    pub fn new(config: WebhookChannelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SINK_TIMEOUT)
            .build()
            .context("failed to build slack http client")?;
        Ok(Self { config, client })
    }

    pub async fn deliver(&self, message: &str) -> Result<()> {
        let payload = SlackPayload {
            text: message,
            username: "LogWatcher",
            icon_emoji: ":warning:",
        };
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("slack webhook request failed")?;
        response
            .error_for_status()
            .context("slack webhook returned an error status")?;
        Ok(())
    }

    pub async fn self_check(&self) -> bool {
        self.client
            .head(&self.config.webhook_url)
            .send()
            .await
            .map(|r| r.error_for_status().is_ok())
            .unwrap_or(false)
    }

    pub async fn close(&self) {}
}
