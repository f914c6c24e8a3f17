//! Microsoft Teams sink — incoming webhook delivery using the MessageCard
//! connector format.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::WebhookChannelConfig;
use crate::sinks::SINK_TIMEOUT;

#[derive(Serialize)]
struct TeamsSection<'a> {
    #[serde(rename = "activityTitle")]
    activity_title: &'a str,
    #[serde(rename = "activitySubtitle")]
    activity_subtitle: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct TeamsPayload<'a> {
    #[serde(rename = "@type")]
    type_: &'a str,
    #[serde(rename = "@context")]
    context: &'a str,
    #[serde(rename = "themeColor")]
    theme_color: &'a str,
    summary: &'a str,
    sections: [TeamsSection<'a>; 1],
}

pub struct TeamsSink {
    config: WebhookChannelConfig,
    client: reqwest::Client,
}

impl TeamsSink {
    pub fn new(config: WebhookChannelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SINK_TIMEOUT)
            .build()
            .context("failed to build teams http client")?;
        Ok(Self { config, client })
    }

    pub async fn deliver(&self, message: &str) -> Result<()> {
        let payload = TeamsPayload {
            type_: "MessageCard",
            context: "http://schema.org/extensions",
            theme_color: "FF0000",
            summary: "LogWatcher Alert",
            sections: [TeamsSection {
                activity_title: "LogWatcher Alert",
                activity_subtitle: "Pattern match detected",
                text: message,
            }],
        };
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("teams webhook request failed")?;
        response
            .error_for_status()
            .context("teams webhook returned an error status")?;
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
