use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Knobs the engine needs at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on waiting for a listing calendar lock.
    pub admission_timeout: Duration,
    /// How many times a transition re-reads and retries after `StaleState`.
    pub transition_retries: u32,
    /// Pending reservations older than this are cancelled by the sweeper.
    pub pending_ttl: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admission_timeout: Duration::from_millis(2_000),
            transition_retries: 3,
            pending_ttl: Some(Duration::from_secs(86_400)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            sweep_interval: Duration::from_secs(60),
            compact_threshold: 1000,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or unparsable values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| parse::<u64>(&s));

        let pending_ttl = match parsed("STAYLOCK_PENDING_TTL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.engine.pending_ttl,
        };

        Self {
            bind: lookup("STAYLOCK_BIND").unwrap_or(defaults.bind),
            port: lookup("STAYLOCK_PORT")
                .and_then(|s| parse(&s))
                .unwrap_or(defaults.port),
            data_dir: lookup("STAYLOCK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: lookup("STAYLOCK_METRICS_PORT").and_then(|s| parse(&s)),
            sweep_interval: parsed("STAYLOCK_SWEEP_INTERVAL_SECS")
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            compact_threshold: parsed("STAYLOCK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            engine: EngineConfig {
                admission_timeout: parsed("STAYLOCK_ADMISSION_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.engine.admission_timeout),
                transition_retries: lookup("STAYLOCK_TRANSITION_RETRIES")
                    .and_then(|s| parse(&s))
                    .unwrap_or(defaults.engine.transition_retries),
                pending_ttl,
            },
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

fn parse<T: FromStr>(s: &str) -> Option<T> {
    s.trim().parse().ok()
}
