//! Collector configuration
//!
//! Loaded from a TOML file; every field has a default so a partial (or
//! empty) file is valid. Command-line flags are applied on top by `main`.

use crate::error::{CollectorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default location of the config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/flowcollectord.toml";

/// Where annotated flows end up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SinkKind {
    /// Newline-delimited JSON on standard output
    Stdout,
    /// Discard every flow
    Null,
    /// Newline-delimited JSON appended to a file
    File(PathBuf),
}

impl FromStr for SinkKind {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Err(CollectorError::Config("sink must not be empty".to_string())),
            "stdout" | "-" => Ok(Self::Stdout),
            "null" => Ok(Self::Null),
            path => Ok(Self::File(PathBuf::from(path))),
        }
    }
}

impl TryFrom<String> for SinkKind {
    type Error = CollectorError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SinkKind> for String {
    fn from(kind: SinkKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Null => write!(f, "null"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// UDP address to receive IPFIX on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Number of ingestion workers sharing the socket
    #[serde(default = "default_workers")]
    pub readers: usize,

    /// Number of annotation workers per input
    #[serde(default = "default_workers")]
    pub annotators: usize,

    /// Aggregation interval flow timestamps are aligned to
    #[serde(default = "default_aggregation_secs")]
    pub aggregation_secs: u64,

    /// Look up AS numbers and prefixes in BIRD instead of trusting the exporter
    #[serde(default)]
    pub bgp_augment: bool,

    #[serde(default = "default_bird_socket")]
    pub bird_socket: PathBuf,

    #[serde(default = "default_bird6_socket")]
    pub bird6_socket: PathBuf,

    /// Diagnostic verbosity (0 quiet, >0 template dumps, >2 flow dumps)
    #[serde(default)]
    pub debug: u8,

    #[serde(default = "default_sink")]
    pub sink: SinkKind,

    /// Address of the Prometheus endpoint; disabled when unset
    #[serde(default)]
    pub metrics_listen: Option<SocketAddr>,

    /// Interval of the periodic stats log line; 0 disables it
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0:4739".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_aggregation_secs() -> u64 {
    60
}

fn default_bird_socket() -> PathBuf {
    PathBuf::from("/var/run/bird/bird.ctl")
}

fn default_bird6_socket() -> PathBuf {
    PathBuf::from("/var/run/bird/bird6.ctl")
}

fn default_sink() -> SinkKind {
    SinkKind::Stdout
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            readers: default_workers(),
            annotators: default_workers(),
            aggregation_secs: default_aggregation_secs(),
            bgp_augment: false,
            bird_socket: default_bird_socket(),
            bird6_socket: default_bird6_socket(),
            debug: 0,
            sink: default_sink(),
            metrics_listen: None,
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl CollectorConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CollectorError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file; a missing file is an error
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CollectorError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            CollectorError::Config(msg) => {
                CollectorError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::metadata(path) {
            Ok(_) => Self::load(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(CollectorError::Io(e)),
        }
    }

    /// Aggregation interval in seconds, as used for timestamp alignment
    pub fn aggregation_interval(&self) -> i64 {
        i64::try_from(self.aggregation_secs).unwrap_or(i64::MAX)
    }

    /// Stats log interval, `None` when disabled
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.readers == 0 {
            return Err(CollectorError::Config("readers must be > 0".to_string()));
        }

        if self.annotators == 0 {
            return Err(CollectorError::Config("annotators must be > 0".to_string()));
        }

        if self.aggregation_secs == 0 {
            return Err(CollectorError::Config(
                "aggregation_secs must be > 0".to_string(),
            ));
        }

        if self.listen.trim().is_empty() {
            return Err(CollectorError::Config("listen must not be empty".to_string()));
        }

        Ok(())
    }
}
