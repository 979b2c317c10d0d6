use thiserror::Error;

/// Failures while decoding the export stream. `record` is the 1-based index of the record being
/// decoded when the failure happened.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("record {record}: failed to read export stream: {source}")]
    Io {
        record: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("record {record}: stream ended before the record terminator")]
    Truncated { record: u64 },
    #[error("record {record}: field line has an empty name")]
    EmptyFieldName { record: u64 },
    #[error("record {record}: field `{field}` is {size} bytes (limit {limit})")]
    FieldTooLarge {
        record: u64,
        field: String,
        size: u64,
        limit: usize,
    },
    #[error("record {record}: binary field `{field}` is not followed by a newline")]
    MissingBinaryTerminator { record: u64, field: String },
    #[error("record {record}: __CURSOR field missing")]
    MissingCursor { record: u64 },
}

impl DecodeError {
    pub fn record(&self) -> u64 {
        match self {
            DecodeError::Io { record, .. }
            | DecodeError::Truncated { record }
            | DecodeError::EmptyFieldName { record }
            | DecodeError::FieldTooLarge { record, .. }
            | DecodeError::MissingBinaryTerminator { record, .. }
            | DecodeError::MissingCursor { record } => *record,
        }
    }

    pub(crate) fn from_io(record: u64, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            DecodeError::Truncated { record }
        } else {
            DecodeError::Io { record, source }
        }
    }
}
