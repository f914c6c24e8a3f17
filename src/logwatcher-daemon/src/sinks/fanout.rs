//! Multi-channel fan-out — dispatches one match to every enabled channel
//! bound to the matched pattern, isolating per-channel failure.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::NotificationsConfig;
use crate::sinks::{EmailSink, SlackSink, TeamsSink, TelegramSink};

pub struct FanoutSink {
    email: Option<EmailSink>,
    slack: Option<SlackSink>,
    teams: Option<TeamsSink>,
    telegram: Option<TelegramSink>,
    notification_rules: RwLock<HashMap<String, Vec<String>>>,
}

impl FanoutSink {
    pub fn new(
        notifications: &NotificationsConfig,
        notification_rules: HashMap<String, Vec<String>>,
    ) -> Result<Self> {
        let email = notifications
            .email
            .enabled
            .then(|| EmailSink::new(notifications.email.clone()))
            .transpose()?;
        let slack = notifications
            .slack
            .enabled
            .then(|| SlackSink::new(notifications.slack.clone()))
            .transpose()?;
        let teams = notifications
            .teams
            .enabled
            .then(|| TeamsSink::new(notifications.teams.clone()))
            .transpose()?;
        let telegram = notifications
            .telegram
            .enabled
            .then(|| TelegramSink::new(notifications.telegram.clone()))
            .transpose()?;

        Ok(Self {
            email,
            slack,
            teams,
            telegram,
            notification_rules: RwLock::new(notification_rules),
        })
    }

    /// Replace the rules used to pick channels, e.g. after a config reload.
    pub async fn set_notification_rules(&self, rules: HashMap<String, Vec<String>>) {
        *self.notification_rules.write().await = rules;
    }

    /// Deliver `message` to every enabled channel bound to `pattern_name`.
    /// Returns `Ok` only if every attempted channel succeeded; a failing
    /// channel is logged and does not prevent delivery to its siblings.
    pub async fn deliver(&self, message: &str, pattern_name: &str) -> Result<()> {
        let channels = {
            let rules = self.notification_rules.read().await;
            rules.get(pattern_name).cloned().unwrap_or_default()
        };

        if channels.is_empty() {
            debug!(pattern = pattern_name, "no notification rule for pattern");
            return Ok(());
        }

        let mut attempts: Vec<(&str, _)> = Vec::new();
        for channel in &channels {
            match channel.as_str() {
                "email" => {
                    if let Some(sink) = &self.email {
                        attempts.push(("email", Box::pin(sink.deliver(message)) as BoxedDelivery));
                    }
                }
                "slack" => {
                    if let Some(sink) = &self.slack {
                        attempts.push(("slack", Box::pin(sink.deliver(message))));
                    }
                }
                "teams" => {
                    if let Some(sink) = &self.teams {
                        attempts.push(("teams", Box::pin(sink.deliver(message))));
                    }
                }
                "telegram" => {
                    if let Some(sink) = &self.telegram {
                        attempts.push(("telegram", Box::pin(sink.deliver(message))));
                    }
                }
                other => {
                    warn!(channel = other, "notification_rules references an unconfigured or disabled channel");
                }
            }
        }

        if attempts.is_empty() {
            return Ok(());
        }

        let (names, futures): (Vec<&str>, Vec<_>) = attempts.into_iter().unzip();
        let results = join_all(futures).await;

        let mut failed = Vec::new();
        for (name, result) in names.into_iter().zip(results) {
            if let Err(e) = result {
                warn!(channel = name, error = %e, "notification channel delivery failed");
                failed.push(name);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("channel(s) failed: {}", failed.join(", ")))
        }
    }

    pub async fn self_check(&self) -> bool {
        let mut checks = Vec::new();
        if let Some(sink) = &self.email {
            checks.push(sink.self_check().await);
        }
        if let Some(sink) = &self.slack {
            checks.push(sink.self_check().await);
        }
        if let Some(sink) = &self.teams {
            checks.push(sink.self_check().await);
        }
        if let Some(sink) = &self.telegram {
            checks.push(sink.self_check().await);
        }
        checks.into_iter().all(|ok| ok)
    }

    pub async fn close(&self) {
        if let Some(sink) = &self.email {
            sink.close().await;
        }
        if let Some(sink) = &self.slack {
            sink.close().await;
        }
        if let Some(sink) = &self.teams {
            sink.close().await;
        }
        if let Some(sink) = &self.telegram {
            sink.close().await;
        }
    }
}

type BoxedDelivery<'a> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;
