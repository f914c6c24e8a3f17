//! Notification sinks. The core pipeline never performs network I/O
//! directly; everything here is a pluggable delivery target invoked by the
//! dispatcher with the rendered match message.

pub mod email;
pub mod fanout;
pub mod slack;
pub mod syslog;
pub mod teams;
pub mod telegram;

pub use email::EmailSink;
pub use fanout::FanoutSink;
pub use slack::SlackSink;
pub use syslog::SyslogSink;
pub use teams::TeamsSink;
pub use telegram::TelegramSink;

/// Default per-attempt network deadline for a sink delivery.
pub const SINK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
