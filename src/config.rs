use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::log::log_level::LogLevel;
use crate::transfer::protocol::CHUNK_OVERHEAD;

/// Reference chunk size for transfers (16 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
/// Outbound queue depth at or below which the next chunk may be queued.
pub const DEFAULT_LOW_WATER_MARK: usize = 64 * 1024;
/// Largest single channel message (SCTP's customary 256 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024;
pub const DEFAULT_HOST_CANDIDATE: &str = "127.0.0.1:50000";
pub const DEFAULT_MAX_FRAMES_PER_TICK: usize = 8;
pub const DEFAULT_MAX_PUMP_ROUNDS: usize = 1_000_000;
pub const DEFAULT_LOG_QUEUE_CAPACITY: usize = 4_096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Read { path: String, reason: String },
    Invalid {
        section: String,
        key: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, reason } => write!(f, "Error reading file {path}: {reason}"),
            ConfigError::Invalid {
                section,
                key,
                reason,
            } => write!(f, "Invalid value for [{section}] {key}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// INI-style configuration: optional globals, then `[Section]` blocks of
/// `key = value` lines. `#` starts a comment line; values may be quoted.
#[derive(Debug, Default)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut globals = HashMap::new();
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current_section = Some(name.trim().to_string());
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim().to_string();
                let value = value.trim().trim_matches('"').to_string();

                match &current_section {
                    None => {
                        globals.insert(key, value);
                    }
                    Some(sec) => {
                        sections.entry(sec.clone()).or_default().insert(key, value);
                    }
                }
            }
        }
        Config { globals, sections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(|s| s.as_str())
    }

    /// Looks up `key` in `section`, then among the globals.
    #[must_use]
    pub fn lookup(&self, section: &str, key: &str) -> Option<&str> {
        self.get_non_empty(section, key)
            .or_else(|| self.get_global(key).filter(|s| !s.is_empty()))
    }

    /// Parses `key` from `section` (or globals). Absent keys yield `Ok(None)`.
    pub fn get_parsed<T>(&self, section: &str, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(raw) = self.lookup(section, key) else {
            return Ok(None);
        };
        raw.parse::<T>()
            .map(Some)
            .map_err(|e| invalid(section, key, e.to_string()))
    }

    fn parsed_or<T>(&self, section: &str, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.get_parsed(section, key)?.unwrap_or(default))
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section: section.to_owned(),
        key: key.to_owned(),
        reason: reason.into(),
    }
}

/// Typed settings for one endpoint, read from `[Transfer]`, `[Channel]` and `[Ice]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub chunk_size: usize,
    pub low_water_mark: usize,
    pub max_message_size: usize,
    /// Addresses advertised as host candidates once a local description is set.
    pub host_candidates: Vec<SocketAddr>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        let host = DEFAULT_HOST_CANDIDATE
            .parse()
            .map(|a| vec![a])
            .unwrap_or_default();
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            host_candidates: host,
        }
    }
}

impl PeerConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let host_candidates = match config.lookup("Ice", "host_candidates") {
            Some(raw) => parse_addr_list(raw)
                .map_err(|reason| invalid("Ice", "host_candidates", reason))?,
            None => defaults.host_candidates,
        };
        let peer = Self {
            chunk_size: config.parsed_or("Transfer", "chunk_size", defaults.chunk_size)?,
            low_water_mark: config.parsed_or(
                "Transfer",
                "low_water_mark",
                defaults.low_water_mark,
            )?,
            max_message_size: config.parsed_or(
                "Channel",
                "max_message_size",
                defaults.max_message_size,
            )?,
            host_candidates,
        };
        peer.validate()?;
        Ok(peer)
    }

    /// Checks that a chunk plus its framing fits in one channel message.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(invalid("Transfer", "chunk_size", "must be greater than zero"));
        }
        let framed = self.chunk_size.checked_add(CHUNK_OVERHEAD);
        if framed.is_none_or(|framed| framed > self.max_message_size) {
            return Err(invalid(
                "Transfer",
                "chunk_size",
                format!(
                    "{} bytes plus {CHUNK_OVERHEAD} bytes of framing exceeds max_message_size {}",
                    self.chunk_size, self.max_message_size
                ),
            ));
        }
        Ok(())
    }
}

fn parse_addr_list(raw: &str) -> Result<Vec<SocketAddr>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<SocketAddr>().map_err(|e| format!("{s}: {e}")))
        .collect()
}

/// Pumping limits for the in-process connection pair, from `[Pair]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairConfig {
    /// Frames moved per direction in one pump tick; models link capacity.
    pub max_frames_per_tick: usize,
    /// Upper bound on ticks in one `pump()` call.
    pub max_pump_rounds: usize,
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            max_frames_per_tick: DEFAULT_MAX_FRAMES_PER_TICK,
            max_pump_rounds: DEFAULT_MAX_PUMP_ROUNDS,
        }
    }
}

impl PairConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let d = Self::default();
        let cfg = Self {
            max_frames_per_tick: config.parsed_or(
                "Pair",
                "max_frames_per_tick",
                d.max_frames_per_tick,
            )?,
            max_pump_rounds: config.parsed_or("Pair", "max_pump_rounds", d.max_pump_rounds)?,
        };
        if cfg.max_frames_per_tick == 0 {
            return Err(invalid("Pair", "max_frames_per_tick", "must be greater than zero"));
        }
        Ok(cfg)
    }
}

/// Logger settings from `[Logging]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub dir: Option<String>,
    pub file_name: Option<String>,
    pub min_level: LogLevel,
    pub queue_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_name: None,
            min_level: LogLevel::Info,
            queue_capacity: DEFAULT_LOG_QUEUE_CAPACITY,
        }
    }
}

impl LogConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            dir: config.get_non_empty("Logging", "log_path").map(str::to_owned),
            file_name: config
                .get_non_empty("Logging", "log_filename")
                .map(str::to_owned),
            min_level: config.parsed_or("Logging", "min_level", d.min_level)?,
            queue_capacity: config.parsed_or("Logging", "queue_capacity", d.queue_capacity)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# global fallback
chunk_size = 4096

[Transfer]
low_water_mark = 8192

[Channel]
max_message_size = "65536"

[Ice]
host_candidates = 10.0.0.2:4000, 10.0.0.3:4001

[Logging]
min_level = debug
log_filename = demo
"#;

    #[test]
    fn sections_fall_back_to_globals() {
        let cfg = Config::parse(SAMPLE);
        assert_eq!(cfg.get("Transfer", "low_water_mark"), Some("8192"));
        assert_eq!(cfg.lookup("Transfer", "chunk_size"), Some("4096"));
        assert_eq!(cfg.get("Channel", "max_message_size"), Some("65536"));
    }

    #[test]
    fn peer_config_reads_typed_values() {
        let peer = PeerConfig::from_config(&Config::parse(SAMPLE)).expect("valid config");
        assert_eq!(peer.chunk_size, 4096);
        assert_eq!(peer.low_water_mark, 8192);
        assert_eq!(peer.max_message_size, 65536);
        assert_eq!(peer.host_candidates.len(), 2);
        assert_eq!(peer.host_candidates[1].port(), 4001);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let peer = PeerConfig::from_config(&Config::empty()).expect("defaults are valid");
        assert_eq!(peer, PeerConfig::default());
        assert_eq!(peer.chunk_size, 16 * 1024);
        let log = LogConfig::from_config(&Config::empty()).expect("defaults are valid");
        assert_eq!(log.min_level, LogLevel::Info);
    }

    #[test]
    fn chunk_larger_than_message_is_rejected() {
        let cfg = Config::parse("[Transfer]\nchunk_size = 70000\n[Channel]\nmax_message_size = 65536\n");
        match PeerConfig::from_config(&cfg) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "chunk_size"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn chunk_size_near_usize_max_is_rejected() {
        let cfg = Config::parse(&format!("[Transfer]\nchunk_size = {}\n", usize::MAX));
        match PeerConfig::from_config(&cfg) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "chunk_size"),
            other => panic!("expected Invalid, got {other:?}"),
        }
        let peer = PeerConfig {
            chunk_size: usize::MAX - 1,
            ..PeerConfig::default()
        };
        assert!(matches!(peer.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn malformed_values_name_the_key() {
        let cfg = Config::parse("[Ice]\nhost_candidates = not-an-addr\n");
        let err = PeerConfig::from_config(&cfg).expect_err("bad address");
        assert!(err.to_string().contains("host_candidates"));

        let cfg = Config::parse("[Logging]\nmin_level = loud\n");
        assert!(LogConfig::from_config(&cfg).is_err());
    }
}
