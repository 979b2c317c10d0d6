use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use journal_export::DecodeLimits;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    committer::DEFAULT_COMMIT_INTERVAL,
    filter::FilterSemantics,
    follower::InputMode,
    sink::{KafkaSettings, SinkKind, DEFAULT_BROKER, DEFAULT_SEND_TIMEOUT, DEFAULT_TOPIC},
};

pub const DEFAULT_CURSOR_FILE: &str = "loglet.cursor";
pub const DEFAULT_JOURNALCTL: &str = "journalctl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("'{raw}' doesn't match expected pattern key=value")]
    MalformedField { raw: String },
    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("at least one broker is required for the kafka sink")]
    NoBrokers,
    #[error("max_field_bytes must be greater than zero")]
    ZeroFieldLimit,
}

/// Runtime settings, read from an optional TOML file and then overridden by flags.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LogletConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub cursor_file: PathBuf,
    /// Fields added to every message that lacks them.
    pub default_fields: BTreeMap<String, String>,
    /// Fields forced onto every message.
    pub override_fields: BTreeMap<String, String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub filter_semantics: FilterSemantics,
    pub partition_key_field: Option<String>,
    pub input: InputMode,
    pub journalctl: PathBuf,
    pub sink: SinkKind,
    pub commit_interval_secs: u64,
    pub send_timeout_secs: u64,
    pub max_field_bytes: usize,
}

impl Default for LogletConfig {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKER.to_string()],
            topic: DEFAULT_TOPIC.to_string(),
            cursor_file: PathBuf::from(DEFAULT_CURSOR_FILE),
            default_fields: BTreeMap::new(),
            override_fields: BTreeMap::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            filter_semantics: FilterSemantics::default(),
            partition_key_field: None,
            input: InputMode::default(),
            journalctl: PathBuf::from(DEFAULT_JOURNALCTL),
            sink: SinkKind::default(),
            commit_interval_secs: DEFAULT_COMMIT_INTERVAL.as_secs(),
            send_timeout_secs: DEFAULT_SEND_TIMEOUT.as_secs(),
            max_field_bytes: DecodeLimits::default().max_field_bytes,
        }
    }
}

impl LogletConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commit_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                name: "commit_interval_secs",
            });
        }
        if self.send_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                name: "send_timeout_secs",
            });
        }
        if self.max_field_bytes == 0 {
            return Err(ConfigError::ZeroFieldLimit);
        }
        if self.sink == SinkKind::Kafka {
            if self.topic.trim().is_empty() {
                return Err(ConfigError::EmptyTopic);
            }
            if self.brokers.iter().all(|broker| broker.trim().is_empty()) {
                return Err(ConfigError::NoBrokers);
            }
        }
        Ok(())
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_secs(self.commit_interval_secs)
    }

    pub fn kafka(&self) -> KafkaSettings {
        KafkaSettings {
            brokers: self
                .brokers
                .iter()
                .filter(|broker| !broker.trim().is_empty())
                .cloned()
                .collect(),
            topic: self.topic.clone(),
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_field_bytes: self.max_field_bytes,
        }
    }
}

/// Parses a single `key=value` pair as accepted by `--default-field` and `--override-field`.
pub fn parse_key_value(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() && !value.contains('=') => {
            Ok((key.to_string(), value.to_string()))
        }
        _ => Err(ConfigError::MalformedField {
            raw: raw.to_string(),
        }),
    }
}
