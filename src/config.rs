//! Configuration Module
//!
//! Handles configuration loading from Java-style .properties files (KEY=VALUE format),
//! the same format the benchmark drivers already use for their own settings.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse property '{key}': {reason}")]
    ParseError { key: String, reason: String },
}

/// How the receive loop waits for inbound bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMode {
    /// Non-blocking read followed by a short sleep, repeated
    Poll,
    /// Wait on socket read-readiness from the reactor, then read
    Event,
}

impl FromStr for ReceiveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "poll" => Ok(ReceiveMode::Poll),
            "event" | "epoll" => Ok(ReceiveMode::Event),
            other => Err(format!("unknown receive mode: {}", other)),
        }
    }
}

/// TCP client configuration
///
/// Property names: HOST, PORT, CLIENT_ID, CONNECT_TIMEOUT_MS, AUTO_RECONNECT,
/// RECONNECT_INTERVAL_MS, RECONNECT_TIMEOUT_MS, HEARTBEAT_INTERVAL_MS, RECEIVE_MODE,
/// POLL_INTERVAL_US, EVENT_WAIT_MS, RECV_BUFFER_SIZE, MAX_QUEUE_DEPTH,
/// REASSEMBLE_FRAMES, HISTOGRAM_SIGNIFICANT_FIGURES, STATS_INTERVAL_SECS
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub client_id: u32,
    pub connect_timeout_ms: u64,
    pub auto_reconnect: bool,
    pub reconnect_interval_ms: u64,
    pub reconnect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub receive_mode: ReceiveMode,
    pub poll_interval_us: u64,
    pub event_wait_ms: u64,
    pub recv_buffer_size: usize,
    /// 0 means unbounded
    pub max_queue_depth: usize,
    pub reassemble_frames: bool,
    pub histogram_significant_figures: u8,
    pub stats_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8888,
            client_id: 1,
            connect_timeout_ms: 5000,
            auto_reconnect: true,
            reconnect_interval_ms: 1000,
            reconnect_timeout_ms: 5000,
            heartbeat_interval_ms: 1000,
            receive_mode: ReceiveMode::Event,
            poll_interval_us: 100,
            event_wait_ms: 100,
            recv_buffer_size: 65536,
            max_queue_depth: 0,
            reassemble_frames: false,
            histogram_significant_figures: 3,
            stats_interval_secs: 5,
        }
    }
}

/// Parse an optional property, falling back to `default` when it is absent.
fn parse_prop<T>(props: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match props.get(key) {
        Some(v) => v.parse().map_err(|_| ConfigError::ParseError {
            key: key.into(),
            reason: format!("invalid {}: {}", std::any::type_name::<T>(), v),
        }),
        None => Ok(default),
    }
}

fn parse_bool(props: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match props.get(key) {
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::ParseError {
            key: key.into(),
            reason: format!("invalid bool: {}", v),
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Parse a Java-style .properties file into a HashMap.
    /// Skips blank lines and lines starting with '#'.
    fn parse_properties(content: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = trimmed.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        map
    }

    /// Load configuration from a .properties file (Java KEY=VALUE format).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_properties_str(&content)
    }

    /// Parse config from a properties-format string.
    pub fn from_properties_str(content: &str) -> Result<Self, ConfigError> {
        let props = Self::parse_properties(content);
        let defaults = Config::default();

        let receive_mode = match props.get("RECEIVE_MODE") {
            Some(v) => v.parse().map_err(|reason| ConfigError::ParseError {
                key: "RECEIVE_MODE".into(),
                reason,
            })?,
            None => defaults.receive_mode,
        };

        Ok(Config {
            host: props.get("HOST").cloned().unwrap_or(defaults.host),
            port: parse_prop(&props, "PORT", defaults.port)?,
            client_id: parse_prop(&props, "CLIENT_ID", defaults.client_id)?,
            connect_timeout_ms: parse_prop(&props, "CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms)?,
            auto_reconnect: parse_bool(&props, "AUTO_RECONNECT", defaults.auto_reconnect)?,
            reconnect_interval_ms: parse_prop(&props, "RECONNECT_INTERVAL_MS", defaults.reconnect_interval_ms)?,
            reconnect_timeout_ms: parse_prop(&props, "RECONNECT_TIMEOUT_MS", defaults.reconnect_timeout_ms)?,
            heartbeat_interval_ms: parse_prop(&props, "HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval_ms)?,
            receive_mode,
            poll_interval_us: parse_prop(&props, "POLL_INTERVAL_US", defaults.poll_interval_us)?,
            event_wait_ms: parse_prop(&props, "EVENT_WAIT_MS", defaults.event_wait_ms)?,
            recv_buffer_size: parse_prop(&props, "RECV_BUFFER_SIZE", defaults.recv_buffer_size)?,
            max_queue_depth: parse_prop(&props, "MAX_QUEUE_DEPTH", defaults.max_queue_depth)?,
            reassemble_frames: parse_bool(&props, "REASSEMBLE_FRAMES", defaults.reassemble_frames)?,
            histogram_significant_figures: parse_prop(
                &props,
                "HISTOGRAM_SIGNIFICANT_FIGURES",
                defaults.histogram_significant_figures,
            )?,
            stats_interval_secs: parse_prop(&props, "STATS_INTERVAL_SECS", defaults.stats_interval_secs)?,
        })
    }

    /// Load configuration, searching for a properties file in standard locations.
    ///
    /// Search order:
    /// 1. ./config.properties
    /// 2. ./client.properties
    pub fn load_or_default() -> Self {
        let search_paths = ["config.properties", "client.properties"];

        for path in &search_paths {
            if Path::new(path).exists() {
                match Self::load(path) {
                    Ok(config) => {
                        log::info!("Loaded configuration from {}", path);
                        return config;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}", path, e);
                    }
                }
            }
        }

        log::warn!("No config.properties found, using defaults");
        Self::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }

    /// Outbound queue limit, `None` when unbounded
    pub fn queue_limit(&self) -> Option<usize> {
        (self.max_queue_depth > 0).then_some(self.max_queue_depth)
    }

    /// Log all configuration parameters for debugging
    pub fn log_config(&self) {
        log::debug!("Configuration:");
        log::debug!("  server: {}:{}", self.host, self.port);
        log::debug!("  client_id: {}", self.client_id);
        log::debug!("  connect_timeout: {} ms", self.connect_timeout_ms);
        log::debug!("  auto_reconnect: {}", self.auto_reconnect);
        log::debug!("  reconnect_interval: {} ms", self.reconnect_interval_ms);
        log::debug!("  reconnect_timeout: {} ms", self.reconnect_timeout_ms);
        log::debug!("  heartbeat_interval: {} ms", self.heartbeat_interval_ms);
        log::debug!("  receive_mode: {:?}", self.receive_mode);
        log::debug!("  poll_interval: {} us", self.poll_interval_us);
        log::debug!("  event_wait: {} ms", self.event_wait_ms);
        log::debug!("  recv_buffer_size: {}", self.recv_buffer_size);
        log::debug!("  max_queue_depth: {}", self.max_queue_depth);
        log::debug!("  reassemble_frames: {}", self.reassemble_frames);
        log::debug!("  histogram_significant_figures: {}", self.histogram_significant_figures);
        log::debug!("  stats_interval: {} s", self.stats_interval_secs);
    }
}
