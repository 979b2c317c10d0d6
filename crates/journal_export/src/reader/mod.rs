mod sync;

#[cfg(feature = "tokio")]
mod tokio;

pub use sync::ExportReader;

#[cfg(feature = "tokio")]
pub use self::tokio::AsyncExportDecoder;

use crate::{
    config::DecodeLimits,
    entry::{Cursor, Fields, JournalEntry, CURSOR_FIELD},
    error::DecodeError,
};

/// What follows a field name, as decided by the byte that ended it.
pub(crate) enum FieldStart {
    EndOfStream,
    Terminator,
    Text(String),
    Binary(String),
}

/// Fields collected so far for the record currently being decoded.
pub(crate) struct PartialRecord {
    number: u64,
    fields: Fields,
}

impl PartialRecord {
    pub(crate) fn new(number: u64) -> Self {
        Self {
            number,
            fields: Fields::new(),
        }
    }

    pub(crate) fn number(&self) -> u64 {
        self.number
    }

    pub(crate) fn insert(&mut self, name: String, value: &[u8]) {
        self.fields
            .insert(name, String::from_utf8_lossy(value).into_owned());
    }

    /// Interprets the bytes read up to the first `=` or `\n` (`delimiter`), or up to EOF.
    pub(crate) fn classify(
        &self,
        name: &[u8],
        delimiter: Option<u8>,
    ) -> Result<FieldStart, DecodeError> {
        match delimiter {
            None if name.is_empty() && self.fields.is_empty() => Ok(FieldStart::EndOfStream),
            None => Err(DecodeError::Truncated {
                record: self.number,
            }),
            Some(b'\n') if name.is_empty() => Ok(FieldStart::Terminator),
            Some(b'\n') => Ok(FieldStart::Binary(field_name(name))),
            Some(_) if name.is_empty() => Err(DecodeError::EmptyFieldName {
                record: self.number,
            }),
            Some(_) => Ok(FieldStart::Text(field_name(name))),
        }
    }

    pub(crate) fn check_size(
        &self,
        name: &[u8],
        size: u64,
        limits: &DecodeLimits,
    ) -> Result<(), DecodeError> {
        if size > limits.max_field_bytes as u64 {
            return Err(DecodeError::FieldTooLarge {
                record: self.number,
                field: field_name(name),
                size,
                limit: limits.max_field_bytes,
            });
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<JournalEntry, DecodeError> {
        let Some(cursor) = self.fields.get(CURSOR_FIELD).cloned() else {
            return Err(DecodeError::MissingCursor {
                record: self.number,
            });
        };
        Ok(JournalEntry {
            cursor: Cursor::new(cursor),
            fields: self.fields,
        })
    }
}

/// Drops the newline ending a text value; `None` when the stream ended before it.
pub(crate) fn strip_text_terminator(mut line: Vec<u8>) -> Option<Vec<u8>> {
    match line.last() {
        Some(b'\n') => {
            line.pop();
            Some(line)
        }
        _ => None,
    }
}

fn field_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
