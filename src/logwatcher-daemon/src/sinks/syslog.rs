//! Remote syslog sink — hand-rolled RFC 3164 framing over UDP or TCP.
//!
//! No syslog crate is used here: the wire format is a handful of lines and
//! the source this was distilled from hand-rolls its own facility table, so
//! there is nothing an external crate would meaningfully abstract over.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use chrono::Local;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::SyslogChannelConfig;
use crate::sinks::SINK_TIMEOUT;

const SEVERITY_INFO: u8 = 6;

fn facility_table() -> &'static HashMap<&'static str, u8> {
    static TABLE: OnceLock<HashMap<&'static str, u8>> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            ("kern", 0),
            ("user", 1),
            ("mail", 2),
            ("daemon", 3),
            ("auth", 4),
            ("syslog", 5),
            ("lpr", 6),
            ("news", 7),
            ("local0", 16),
            ("local1", 17),
            ("local2", 18),
            ("local3", 19),
            ("local4", 20),
            ("local5", 21),
            ("local6", 22),
            ("local7", 23),
        ]
        .into_iter()
        .collect()
    })
}

enum Transport {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

pub struct SyslogSink {
    config: SyslogChannelConfig,
    facility_code: u8,
    transport: Mutex<Option<Transport>>,
}

impl SyslogSink {
    pub fn new(config: SyslogChannelConfig) -> Self {
        let facility_code = *facility_table().get(config.facility.as_str()).unwrap_or_else(|| {
            warn!(facility = %config.facility, "invalid syslog facility, defaulting to local0");
            facility_table().get("local0").unwrap()
        });

        Self {
            config,
            facility_code,
            transport: Mutex::new(None),
        }
    }

    fn frame(&self, message: &str) -> Vec<u8> {
        let priority = self.facility_code * 8 + SEVERITY_INFO;
        let timestamp = Local::now().format("%b %e %H:%M:%S");
        let single_line = message.replace('\n', " | ");
        format!(
            "<{priority}>{timestamp} {tag}: {single_line}\n",
            tag = self.config.tag
        )
        .into_bytes()
    }

    async fn connect(&self) -> Result<Transport> {
        let addr = (self.config.host.as_str(), self.config.port);
        match self.config.protocol.to_lowercase().as_str() {
            "tcp" => {
                let stream = tokio::time::timeout(SINK_TIMEOUT, TcpStream::connect(addr))
                    .await
                    .context("syslog tcp connect timed out")?
                    .context("syslog tcp connect failed")?;
                Ok(Transport::Tcp(stream))
            }
            _ => {
                let socket = UdpSocket::bind(("0.0.0.0", 0))
                    .await
                    .context("failed to bind local udp socket")?;
                socket
                    .connect(addr)
                    .await
                    .context("syslog udp connect failed")?;
                Ok(Transport::Udp(socket))
            }
        }
    }

    pub async fn deliver(&self, message: &str) -> Result<()> {
        if !self.config.enabled {
            bail!("syslog sink not enabled");
        }

        let mut guard = self.transport.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }

        let framed = self.frame(message);
        let result = match guard.as_mut().unwrap() {
            Transport::Udp(socket) => socket.send(&framed).await.map(|_| ()),
            Transport::Tcp(stream) => stream.write_all(&framed).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                // Drop the connection so the next attempt reinitialises it.
                *guard = None;
                Err(anyhow::Error::from(e).context("syslog send failed"))
            }
        }
    }

    pub async fn self_check(&self) -> bool {
        if !self.config.enabled {
            return true;
        }
        self.connect().await.is_ok()
    }

    pub async fn close(&self) {
        *self.transport.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_facility_falls_back_to_local0() {
        let config = SyslogChannelConfig {
            enabled: true,
            host: "localhost".to_string(),
            port: 514,
            facility: "bogus".to_string(),
            protocol: "udp".to_string(),
            tag: "logwatcher".to_string(),
        };
        let sink = SyslogSink::new(config);
        assert_eq!(sink.facility_code, 16);
    }

    #[test]
    fn frame_contains_priority_and_tag() {
        let config = SyslogChannelConfig {
            enabled: true,
            host: "localhost".to_string(),
            port: 514,
            facility: "local0".to_string(),
            protocol: "udp".to_string(),
            tag: "logwatcher".to_string(),
        };
        let sink = SyslogSink::new(config);
        let framed = sink.frame("line1\nline2");
        let text = String::from_utf8(framed).unwrap();
        assert!(text.starts_with("<134>"));
        assert!(text.contains("logwatcher:"));
        assert!(text.contains("line1 | line2"));
    }
}
