use std::env::var;
use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;
use lookout_core::Timeouts;

/// Agent configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Game console log to tail, read whenever the file system reports a change
    /// Env: LOG_PATH (optional, tailing is disabled when unset)
    pub log_path: Option<PathBuf>,

    /// File the G15 dump is written to by the remote console invoker
    /// Env: G15_DUMP_PATH (optional, dump polling is disabled when unset)
    pub g15_dump_path: Option<PathBuf>,

    /// Env: G15_POLL_INTERVAL_SECS (default: 2)
    pub g15_poll_interval: Duration,

    /// Rule list documents to load at startup and on reload
    /// Env: RULE_LISTS (comma separated paths, default: none)
    pub rule_lists: Vec<PathBuf>,

    /// Where manual marks are read from and written back to
    /// Env: LOCAL_LIST_PATH (optional)
    pub local_list_path: Option<PathBuf>,

    /// Seconds without an update before a player counts as disconnected
    /// Env: PLAYER_DISCONNECT_TIMEOUT_SECS (default: 6)
    pub player_disconnect_timeout: i64,

    /// Seconds without an update before a player is evicted
    /// Env: PLAYER_EXPIRE_TIMEOUT_SECS (default: 20)
    pub player_expire_timeout: i64,

    /// Env: EVICT_INTERVAL_SECS (default: 1)
    pub evict_interval: Duration,

    /// How often matched players are reported
    /// Env: REPORT_INTERVAL_SECS (default: 10)
    pub report_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv();
        Self {
            log_path: var("LOG_PATH").ok().map(PathBuf::from),
            g15_dump_path: var("G15_DUMP_PATH").ok().map(PathBuf::from),
            g15_poll_interval: Duration::from_secs(env_or_default("G15_POLL_INTERVAL_SECS", 2)),
            rule_lists: var("RULE_LISTS")
                .map(|v| parse_path_list(&v))
                .unwrap_or_default(),
            local_list_path: var("LOCAL_LIST_PATH").ok().map(PathBuf::from),
            player_disconnect_timeout: env_or_default("PLAYER_DISCONNECT_TIMEOUT_SECS", 6),
            player_expire_timeout: env_or_default("PLAYER_EXPIRE_TIMEOUT_SECS", 20),
            evict_interval: Duration::from_secs(env_or_default("EVICT_INTERVAL_SECS", 1)),
            report_interval: Duration::from_secs(env_or_default("REPORT_INTERVAL_SECS", 10)),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            disconnect: self.player_disconnect_timeout,
            expire: self.player_expire_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: None,
            g15_dump_path: None,
            g15_poll_interval: Duration::from_secs(2),
            rule_lists: Vec::new(),
            local_list_path: None,
            player_disconnect_timeout: 6,
            player_expire_timeout: 20,
            evict_interval: Duration::from_secs(1),
            report_interval: Duration::from_secs(10),
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

fn parse_path_list(value: &str) -> Vec<PathBuf> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}
