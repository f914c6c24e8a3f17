//! Configuration loading, schema validation, and hot-reload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use logwatcher_core::{FilePatternBinding, PatternSet};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_buffer_size() -> usize {
    20
}

fn default_max_retries() -> u32 {
    3
}

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `name -> regex source`.
    pub patterns: HashMap<String, String>,
    /// `path -> [pattern name, ...]`.
    pub file_patterns: HashMap<String, Vec<String>>,
    pub settings: Settings,
    pub notifications: NotificationsConfig,
    /// `pattern name -> [channel name, ...]`.
    pub notification_rules: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_encoding")]
    pub encoding: String,
    pub read_chunk_size: usize,
    pub notification_rate_limit: u64,
    pub max_file_size: Option<u64>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Notification queue capacity before drop-oldest kicks in.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of concurrent dispatcher workers draining the queue.
    #[serde(default = "default_dispatcher_workers")]
    pub dispatcher_workers: usize,
    /// Per-sink-attempt network deadline, in seconds.
    #[serde(default = "default_sink_timeout_secs")]
    pub sink_timeout_secs: u64,
}

fn default_queue_capacity() -> usize {
    1024
}
fn default_dispatcher_workers() -> usize {
    2
}
fn default_sink_timeout_secs() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            read_chunk_size: 8192,
            notification_rate_limit: 60,
            max_file_size: None,
            buffer_size: default_buffer_size(),
            max_retries: default_max_retries(),
            queue_capacity: default_queue_capacity(),
            dispatcher_workers: default_dispatcher_workers(),
            sink_timeout_secs: default_sink_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub email: EmailChannelConfig,
    #[serde(default)]
    pub slack: WebhookChannelConfig,
    #[serde(default)]
    pub teams: WebhookChannelConfig,
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
    #[serde(default)]
    pub syslog: SyslogChannelConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default)]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub to_address: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyslogChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_facility")]
    pub facility: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_facility() -> String {
    "local0".to_string()
}
fn default_protocol() -> String {
    "udp".to_string()
}
fn default_tag() -> String {
    "logwatcher".to_string()
}

impl Default for SyslogChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 0,
            facility: default_facility(),
            protocol: default_protocol(),
            tag: default_tag(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patterns: HashMap::new(),
            file_patterns: HashMap::new(),
            settings: Settings::default(),
            notifications: NotificationsConfig::default(),
            notification_rules: HashMap::new(),
        }
    }
}

const KNOWN_FACILITIES: &[&str] = &[
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "local0", "local1",
    "local2", "local3", "local4", "local5", "local6", "local7",
];

const KNOWN_CHANNELS: &[&str] = &["email", "slack", "teams", "telegram", "syslog"];

/// Validate a loaded configuration against the schema rules. Any violation
/// is a fatal startup error.
pub fn validate(config: &Config) -> Result<()> {
    if config.settings.read_chunk_size < 1024 {
        bail!(
            "settings.read_chunk_size must be >= 1024, got {}",
            config.settings.read_chunk_size
        );
    }
    if config.settings.buffer_size == 0 {
        bail!("settings.buffer_size must be >= 1");
    }
    if config.settings.max_retries == 0 {
        bail!("settings.max_retries must be >= 1");
    }
    if config.settings.queue_capacity == 0 {
        bail!("settings.queue_capacity must be >= 1");
    }
    if config.settings.dispatcher_workers == 0 {
        bail!("settings.dispatcher_workers must be >= 1");
    }

    for (name, source) in &config.patterns {
        regex::Regex::new(source).with_context(|| format!("invalid regex for pattern {name}"))?;
    }

    for (path, names) in &config.file_patterns {
        for name in names {
            if !config.patterns.contains_key(name) {
                bail!("file_patterns[{path}] references unknown pattern {name}");
            }
        }
    }

    for (pattern, channels) in &config.notification_rules {
        if !config.patterns.contains_key(pattern) {
            bail!("notification_rules references unknown pattern {pattern}");
        }
        for channel in channels {
            if !KNOWN_CHANNELS.contains(&channel.as_str()) {
                bail!("notification_rules[{pattern}] references unknown channel {channel}");
            }
        }
    }

    if config.notifications.syslog.enabled && !KNOWN_FACILITIES.contains(&config.notifications.syslog.facility.as_str()) {
        warn!(
            facility = %config.notifications.syslog.facility,
            "unknown syslog facility, falling back to local0"
        );
    }

    if config.settings.encoding != "utf-8" {
        warn!(encoding = %config.settings.encoding, "only utf-8 is supported, ignoring configured encoding");
    }

    Ok(())
}

/// Build the immutable pattern set and file-to-pattern bindings from a
/// validated configuration.
///
/// `validate()` already rejects a binding that names an unknown pattern, but
/// this is also called directly by hot-reload (`apply_config_change`) and is
/// a public library entry point in its own right, so it re-checks every
/// binding against the freshly built `PatternSet` rather than trusting that
/// validation ran first.
pub fn build_pattern_tables(config: &Config) -> Result<(PatternSet, FilePatternBinding)> {
    let patterns = PatternSet::build(config.patterns.clone())?;
    for names in config.file_patterns.values() {
        for name in names {
            patterns.get_checked(name)?;
        }
    }
    let bindings = FilePatternBinding::build(
        config
            .file_patterns
            .iter()
            .map(|(path, names)| (path.clone(), names.clone())),
    );
    Ok((patterns, bindings))
}

/// Owns the live configuration and mediates hot-reload.
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    config_path: Option<PathBuf>,
    change_sender: broadcast::Sender<Config>,
}

impl ConfigManager {
    pub fn new() -> Self {
        let (change_sender, _) = broadcast::channel(10);
        Self {
            config: Arc::new(RwLock::new(Config::default())),
            config_path: None,
            change_sender,
        }
    }

    pub async fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let new_config: Config =
            toml::from_str(&raw).with_context(|| "failed to parse config file")?;
        validate(&new_config)?;

        {
            let mut guard = self.config.write().await;
            *guard = new_config.clone();
        }
        self.config_path = Some(path.to_path_buf());

        if let Err(e) = self.change_sender.send(new_config) {
            debug!("no config change subscribers: {e}");
        }

        info!("loaded configuration from {}", path.display());
        Ok(())
    }

    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = self.config.read().await;
        let rendered = toml::to_string_pretty(&*config)?;
        tokio::fs::write(path.as_ref(), rendered)
            .await
            .with_context(|| format!("failed to write config file: {}", path.as_ref().display()))?;
        info!("saved configuration to {}", path.as_ref().display());
        Ok(())
    }

    pub async fn get_config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<Config> {
        self.change_sender.subscribe()
    }

    /// Poll the config file's mtime and reload on change. Never terminates;
    /// reload failures are logged and the previous configuration is kept.
    pub async fn start_hot_reload(&self) -> Result<()> {
        let config_path = self
            .config_path
            .clone()
            .context("no config file loaded")?;
        let config = Arc::clone(&self.config);
        let change_sender = self.change_sender.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            let mut last_modified = None;

            loop {
                interval.tick().await;
                let metadata = match tokio::fs::metadata(&config_path).await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("failed to stat config file: {e}");
                        continue;
                    }
                };
                let modified = metadata.modified().ok();
                if last_modified.is_none() {
                    last_modified = modified;
                    continue;
                }
                if modified == last_modified {
                    continue;
                }
                last_modified = modified;

                match tokio::fs::read_to_string(&config_path).await {
                    Ok(raw) => match toml::from_str::<Config>(&raw).map_err(anyhow::Error::from).and_then(|c| validate(&c).map(|_| c)) {
                        Ok(new_config) => {
                            *config.write().await = new_config.clone();
                            info!("hot-reloaded configuration");
                            let _ = change_sender.send(new_config);
                        }
                        Err(e) => warn!("failed to hot-reload config: {e}"),
                    },
                    Err(e) => warn!("failed to read config file for hot-reload: {e}"),
                }
            }
        });

        info!("started configuration hot-reload monitoring");
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
[patterns]
err = "ERROR"

[file_patterns]
"/var/log/app.log" = ["err"]

[settings]
read_chunk_size = 8192
notification_rate_limit = 60

[notifications.slack]
enabled = true
webhook_url = "https://hooks.example/x"

[notification_rules]
err = ["slack"]
"#
    }

    #[tokio::test]
    async fn loads_and_validates_sample_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, sample_toml().as_bytes()).unwrap();

        let mut manager = ConfigManager::new();
        manager.load_from_file(file.path()).await.unwrap();
        let config = manager.get_config().await;
        assert_eq!(config.patterns.get("err").unwrap(), "ERROR");
        assert!(config.notifications.slack.enabled);
    }

    #[test]
    fn rejects_small_read_chunk_size() {
        let mut config = Config::default();
        config.settings.read_chunk_size = 100;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_file_pattern_referencing_unknown_pattern() {
        let mut config = Config::default();
        config.settings.read_chunk_size = 8192;
        config
            .file_patterns
            .insert("a.log".to_string(), vec!["missing".to_string()]);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        let mut config = Config::default();
        config.settings.read_chunk_size = 8192;
        config.patterns.insert("err".to_string(), "ERROR".to_string());
        config
            .file_patterns
            .insert("a.log".to_string(), vec!["err".to_string()]);
        config
            .notification_rules
            .insert("err".to_string(), vec!["slack".to_string()]);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn build_pattern_tables_rejects_dangling_binding() {
        let mut config = Config::default();
        config
            .file_patterns
            .insert("a.log".to_string(), vec!["missing".to_string()]);
        assert!(build_pattern_tables(&config).is_err());
    }

    #[test]
    fn build_pattern_tables_succeeds_for_well_formed_config() {
        let mut config = Config::default();
        config.patterns.insert("err".to_string(), "ERROR".to_string());
        config
            .file_patterns
            .insert("a.log".to_string(), vec!["err".to_string()]);
        let (patterns, bindings) = build_pattern_tables(&config).unwrap();
        assert!(patterns.get("err").is_some());
        assert_eq!(bindings.patterns_for("a.log"), &["err".to_string()]);
    }
}
