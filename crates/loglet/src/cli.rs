use std::path::PathBuf;

use clap::Parser;

use crate::{
    config::{parse_key_value, ConfigError, LogletConfig},
    filter::FilterSemantics,
    follower::InputMode,
    sink::SinkKind,
};

#[derive(Debug, Parser)]
#[command(name = "loglet", version)]
#[command(about = "Forwards systemd journal entries to Kafka, resuming from a saved cursor")]
pub struct Cli {
    /// TOML file with settings; flags given on the command line take precedence.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Kafka broker address. Repeat for several brokers.
    #[arg(long = "broker")]
    pub brokers: Vec<String>,

    /// Kafka topic receiving the messages.
    #[arg(long)]
    pub topic: Option<String>,

    /// File holding the cursor of the last delivered entry.
    #[arg(long)]
    pub cursor_file: Option<PathBuf>,

    /// `key=value` added to messages that do not carry `key`.
    #[arg(long = "default-field", value_parser = parse_key_value)]
    pub default_fields: Vec<(String, String)>,

    /// `key=value` set on every message, replacing existing values.
    #[arg(long = "override-field", value_parser = parse_key_value)]
    pub override_fields: Vec<(String, String)>,

    /// Only forward entries matching `KEY=value[,KEY=value...]`. Repeat to accept any of
    /// several groups.
    #[arg(long)]
    pub include: Vec<String>,

    /// Drop entries matching `KEY=value[,KEY=value...]`, even when included.
    #[arg(long)]
    pub exclude: Vec<String>,

    #[arg(long, value_enum)]
    pub filter_semantics: Option<FilterSemantics>,

    /// Message field whose value becomes the Kafka message key.
    #[arg(long)]
    pub partition_key_field: Option<String>,

    /// Where export data comes from.
    #[arg(long, value_enum)]
    pub input: Option<InputMode>,

    /// Path of the journalctl binary.
    #[arg(long)]
    pub journalctl: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub sink: Option<SinkKind>,

    /// Accept and drop every message instead of sending it to Kafka.
    #[arg(long, hide = true, conflicts_with = "sink")]
    pub fake_kafka: bool,

    /// Seconds between cursor commits.
    #[arg(long, value_name = "SECS")]
    pub commit_interval: Option<u64>,

    /// Seconds a single Kafka delivery may take.
    #[arg(long, value_name = "SECS")]
    pub send_timeout: Option<u64>,

    /// Log filter, e.g. `info` or `loglet=debug`. Defaults to `RUST_LOG`, then `info`.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Reads the config file, if any, applies the flags on top and validates the result.
    pub fn resolve_config(&self) -> Result<LogletConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => LogletConfig::load(path)?,
            None => LogletConfig::default(),
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, mut config: LogletConfig) -> LogletConfig {
        if !self.brokers.is_empty() {
            config.brokers = self.brokers.clone();
        }
        if let Some(topic) = &self.topic {
            config.topic = topic.clone();
        }
        if let Some(path) = &self.cursor_file {
            config.cursor_file = path.clone();
        }
        config
            .default_fields
            .extend(self.default_fields.iter().cloned());
        config
            .override_fields
            .extend(self.override_fields.iter().cloned());
        if !self.include.is_empty() {
            config.include = self.include.clone();
        }
        if !self.exclude.is_empty() {
            config.exclude = self.exclude.clone();
        }
        if let Some(semantics) = self.filter_semantics {
            config.filter_semantics = semantics;
        }
        if let Some(field) = &self.partition_key_field {
            config.partition_key_field = Some(field.clone());
        }
        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(path) = &self.journalctl {
            config.journalctl = path.clone();
        }
        if let Some(sink) = self.sink {
            config.sink = sink;
        }
        if self.fake_kafka {
            config.sink = SinkKind::Discard;
        }
        if let Some(secs) = self.commit_interval {
            config.commit_interval_secs = secs;
        }
        if let Some(secs) = self.send_timeout {
            config.send_timeout_secs = secs;
        }
        config
    }
}
