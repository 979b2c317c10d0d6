use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{strip_text_terminator, FieldStart, PartialRecord};
use crate::{config::DecodeLimits, entry::JournalEntry, error::DecodeError};

/// Async counterpart of [`crate::ExportReader`].
///
/// `next_entry` is not cancel-safe: dropping it mid-record loses the bytes already consumed, so
/// callers should stop decoding once they abandon a pending call.
pub struct AsyncExportDecoder<R: AsyncBufRead + Unpin> {
    reader: R,
    limits: DecodeLimits,
    records: u64,
}

impl<R: AsyncBufRead + Unpin> AsyncExportDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, DecodeLimits::default())
    }

    pub fn with_limits(reader: R, limits: DecodeLimits) -> Self {
        Self {
            reader,
            limits,
            records: 0,
        }
    }

    pub fn records_decoded(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub async fn next_entry(&mut self) -> Result<Option<JournalEntry>, DecodeError> {
        let mut record = PartialRecord::new(self.records + 1);
        loop {
            let mut name = Vec::new();
            let delimiter = self.read_name(&record, &mut name).await?;
            match record.classify(&name, delimiter)? {
                FieldStart::EndOfStream => return Ok(None),
                FieldStart::Terminator => {
                    let entry = record.finish()?;
                    self.records += 1;
                    return Ok(Some(entry));
                }
                FieldStart::Text(field) => {
                    let value = self.read_text(&record, &name).await?;
                    record.insert(field, &value);
                }
                FieldStart::Binary(field) => {
                    let value = self.read_binary(&record, &name, &field).await?;
                    record.insert(field, &value);
                }
            }
        }
    }

    async fn read_name(
        &mut self,
        record: &PartialRecord,
        name: &mut Vec<u8>,
    ) -> Result<Option<u8>, DecodeError> {
        loop {
            let available = self
                .reader
                .fill_buf()
                .await
                .map_err(|source| DecodeError::from_io(record.number(), source))?;
            if available.is_empty() {
                return Ok(None);
            }
            let (consumed, delimiter) =
                match available.iter().position(|b| *b == b'=' || *b == b'\n') {
                    Some(idx) => {
                        name.extend_from_slice(&available[..idx]);
                        (idx + 1, Some(available[idx]))
                    }
                    None => {
                        name.extend_from_slice(available);
                        (available.len(), None)
                    }
                };
            self.reader.consume(consumed);
            let len = name.len() as u64;
            record.check_size(name, len, &self.limits)?;
            if delimiter.is_some() {
                return Ok(delimiter);
            }
        }
    }

    async fn read_text(
        &mut self,
        record: &PartialRecord,
        name: &[u8],
    ) -> Result<Vec<u8>, DecodeError> {
        let limit = self.limits.max_field_bytes as u64;
        let mut line = Vec::new();
        (&mut self.reader)
            .take(limit + 1)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|source| DecodeError::from_io(record.number(), source))?;
        if line.last() != Some(&b'\n') {
            record.check_size(name, line.len() as u64, &self.limits)?;
        }
        strip_text_terminator(line).ok_or(DecodeError::Truncated {
            record: record.number(),
        })
    }

    async fn read_binary(
        &mut self,
        record: &PartialRecord,
        name: &[u8],
        field: &str,
    ) -> Result<Vec<u8>, DecodeError> {
        let io_err = |source| DecodeError::from_io(record.number(), source);

        let size = self.reader.read_u64_le().await.map_err(io_err)?;
        record.check_size(name, size, &self.limits)?;

        let mut value = vec![0u8; size as usize];
        self.reader.read_exact(&mut value).await.map_err(io_err)?;

        let terminator = self.reader.read_u8().await.map_err(io_err)?;
        if terminator != b'\n' {
            return Err(DecodeError::MissingBinaryTerminator {
                record: record.number(),
                field: field.to_string(),
            });
        }
        Ok(value)
    }
}
