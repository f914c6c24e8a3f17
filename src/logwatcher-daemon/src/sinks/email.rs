//! Email sink — SMTP delivery via STARTTLS, mirroring the source's
//! smtplib-based notifier.

use anyhow::{Context, Result};
use lettre::message::Message;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::config::EmailChannelConfig;

pub struct EmailSink {
    config: EmailChannelConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSink {
    pub fn new(config: EmailChannelConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .with_context(|| format!("invalid SMTP relay {}", config.smtp_server))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { config, transport })
    }

    pub async fn deliver(&self, message: &str) -> Result<()> {
        if self.config.to_address.is_empty() {
            anyhow::bail!("email sink has no configured recipients");
        }

        let mut builder = Message::builder()
            .from(self.config.username.parse().context("invalid from address")?)
            .subject("LogWatcher Alert");
        for address in &self.config.to_address {
            builder = builder.to(address.parse().with_context(|| format!("invalid to address {address}"))?);
        }
        let email = builder
            .body(message.to_string())
            .context("failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("SMTP send failed")?;
        Ok(())
    }

    pub async fn self_check(&self) -> bool {
        // A lightweight reachability probe: a plain TCP connect to the relay
        // rather than a full STARTTLS handshake and login.
        let addr = (self.config.smtp_server.as_str(), self.config.smtp_port);
        tokio::time::timeout(
            crate::sinks::SINK_TIMEOUT,
            tokio::net::TcpStream::connect(addr),
        )
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
    }

    pub async fn close(&self) {}
}
