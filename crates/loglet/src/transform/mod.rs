//! Normalization, enrichment and JSON encoding of journal entries.
//!
//! Field names are lower-cased and stripped of leading underscores, a fixed set of noisy
//! journal fields is dropped, `@timestamp` is derived from `realtime_timestamp`, and the
//! configured [`Enrichment`] stages run in order before the message is serialized.

use std::collections::BTreeMap;

use journal_export::{Cursor, JournalEntry};
use serde_json::Value;
use thiserror::Error;
use time::{macros::format_description, OffsetDateTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod enrich;

pub use enrich::{DefaultFields, Enrichment, FieldStage, LogMessage, OverrideFields};

/// Normalized journal fields never forwarded to the sink.
pub const DENYLIST: &[&str] = &[
    "cap_effective",
    "cmdline",
    "exe",
    "machine_id",
    "monotonic_timestamp",
    "source_monotonic_timestamp",
    "source_realtime_timestamp",
    "syslog_facility",
    "syslog_identifier",
    "transport",
];

pub const REALTIME_TIMESTAMP_FIELD: &str = "realtime_timestamp";
pub const TIMESTAMP_FIELD: &str = "@timestamp";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("entry {cursor} has no realtime_timestamp field")]
    MissingTimestamp { cursor: Cursor },
    #[error("entry {cursor} has an invalid realtime_timestamp `{value}`")]
    InvalidTimestamp { cursor: Cursor, value: String },
    #[error("failed to format timestamp of entry {cursor}: {source}")]
    FormatTimestamp {
        cursor: Cursor,
        #[source]
        source: time::error::Format,
    },
    #[error("failed to encode entry {cursor}: {source}")]
    Encode {
        cursor: Cursor,
        #[source]
        source: serde_json::Error,
    },
}

/// A serialized message ready for the sink, still tagged with the cursor of its entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedMessage {
    pub cursor: Cursor,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Turns [`JournalEntry`] values into [`EncodedMessage`] values.
#[derive(Clone, Debug, Default)]
pub struct Transformer {
    enrichments: Vec<Enrichment>,
    key_field: Option<String>,
}

impl Transformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an enrichment stage; stages run in insertion order.
    pub fn enrichment(mut self, stage: Enrichment) -> Self {
        self.enrichments.push(stage);
        self
    }

    pub fn default_fields(self, fields: BTreeMap<String, String>) -> Self {
        if fields.is_empty() {
            return self;
        }
        self.enrichment(Enrichment::Defaults(DefaultFields::new(fields)))
    }

    pub fn override_fields(self, fields: BTreeMap<String, String>) -> Self {
        if fields.is_empty() {
            return self;
        }
        self.enrichment(Enrichment::Overrides(OverrideFields::new(fields)))
    }

    /// Uses the named field of the final message as the sink partition key.
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }

    pub fn enrichments(&self) -> &[Enrichment] {
        &self.enrichments
    }

    pub fn encode(&self, entry: JournalEntry) -> Result<EncodedMessage, TransformError> {
        let JournalEntry { cursor, fields } = entry;

        let mut message = LogMessage::default();
        for (name, value) in fields {
            let name = normalize_name(&name);
            if DENYLIST.contains(&name.as_str()) {
                continue;
            }
            message.fields.insert(name, Value::String(value));
        }

        let timestamp = format_timestamp(&cursor, &message)?;
        message
            .fields
            .insert(TIMESTAMP_FIELD.to_string(), Value::String(timestamp));

        for stage in &self.enrichments {
            stage.apply(&mut message);
        }

        let key = self
            .key_field
            .as_deref()
            .and_then(|field| message.get_str(field))
            .map(str::to_string);

        let payload = serde_json::to_vec(&message.fields).map_err(|source| {
            TransformError::Encode {
                cursor: cursor.clone(),
                source,
            }
        })?;

        Ok(EncodedMessage {
            cursor,
            key,
            payload,
        })
    }

    pub async fn run(
        self,
        mut entries: mpsc::Receiver<JournalEntry>,
        encoded: mpsc::Sender<EncodedMessage>,
        cancel: CancellationToken,
    ) -> Result<(), TransformError> {
        loop {
            let entry = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                entry = entries.recv() => match entry {
                    Some(entry) => entry,
                    None => return Ok(()),
                },
            };

            let message = self.encode(entry)?;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                sent = encoded.send(message) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim_start_matches('_').to_lowercase()
}

fn format_timestamp(cursor: &Cursor, message: &LogMessage) -> Result<String, TransformError> {
    let raw = message
        .get_str(REALTIME_TIMESTAMP_FIELD)
        .ok_or_else(|| TransformError::MissingTimestamp {
            cursor: cursor.clone(),
        })?;

    let invalid = || TransformError::InvalidTimestamp {
        cursor: cursor.clone(),
        value: raw.to_string(),
    };
    let micros: i64 = raw.parse().map_err(|_| invalid())?;
    let at = OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|_| invalid())?;

    let format =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
    at.format(&format)
        .map_err(|source| TransformError::FormatTimestamp {
            cursor: cursor.clone(),
            source,
        })
}
