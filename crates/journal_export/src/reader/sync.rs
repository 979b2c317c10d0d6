use std::io::{BufRead, Read};

use super::{strip_text_terminator, FieldStart, PartialRecord};
use crate::{config::DecodeLimits, entry::JournalEntry, error::DecodeError};

/// Blocking decoder yielding one [`JournalEntry`] per export record.
///
/// Iteration stops after the first error; the stream position is undefined from then on.
pub struct ExportReader<R: BufRead> {
    reader: R,
    limits: DecodeLimits,
    records: u64,
    done: bool,
}

impl<R: BufRead> ExportReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, DecodeLimits::default())
    }

    pub fn with_limits(reader: R, limits: DecodeLimits) -> Self {
        Self {
            reader,
            limits,
            records: 0,
            done: false,
        }
    }

    /// Number of records successfully decoded so far.
    pub fn records_decoded(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Decodes the next record. `Ok(None)` means the stream ended cleanly between records.
    pub fn next_entry(&mut self) -> Result<Option<JournalEntry>, DecodeError> {
        let mut record = PartialRecord::new(self.records + 1);
        loop {
            let mut name = Vec::new();
            let delimiter = self.read_name(&record, &mut name)?;
            match record.classify(&name, delimiter)? {
                FieldStart::EndOfStream => return Ok(None),
                FieldStart::Terminator => {
                    let entry = record.finish()?;
                    self.records += 1;
                    return Ok(Some(entry));
                }
                FieldStart::Text(field) => {
                    let value = self.read_text(&record, &name)?;
                    record.insert(field, &value);
                }
                FieldStart::Binary(field) => {
                    let value = self.read_binary(&record, &name, &field)?;
                    record.insert(field, &value);
                }
            }
        }
    }

    fn read_name(
        &mut self,
        record: &PartialRecord,
        name: &mut Vec<u8>,
    ) -> Result<Option<u8>, DecodeError> {
        loop {
            let available = self
                .reader
                .fill_buf()
                .map_err(|source| DecodeError::from_io(record.number(), source))?;
            if available.is_empty() {
                return Ok(None);
            }
            match available.iter().position(|b| *b == b'=' || *b == b'\n') {
                Some(idx) => {
                    let delimiter = available[idx];
                    name.extend_from_slice(&available[..idx]);
                    self.reader.consume(idx + 1);
                    let len = name.len() as u64;
                    record.check_size(name, len, &self.limits)?;
                    return Ok(Some(delimiter));
                }
                None => {
                    let len = available.len();
                    name.extend_from_slice(available);
                    self.reader.consume(len);
                    let len = name.len() as u64;
                    record.check_size(name, len, &self.limits)?;
                }
            }
        }
    }

    fn read_text(&mut self, record: &PartialRecord, name: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let limit = self.limits.max_field_bytes as u64;
        let mut line = Vec::new();
        (&mut self.reader)
            .take(limit + 1)
            .read_until(b'\n', &mut line)
            .map_err(|source| DecodeError::from_io(record.number(), source))?;
        if line.last() != Some(&b'\n') {
            record.check_size(name, line.len() as u64, &self.limits)?;
        }
        strip_text_terminator(line).ok_or(DecodeError::Truncated {
            record: record.number(),
        })
    }

    fn read_binary(
        &mut self,
        record: &PartialRecord,
        name: &[u8],
        field: &str,
    ) -> Result<Vec<u8>, DecodeError> {
        let io_err = |source| DecodeError::from_io(record.number(), source);

        let mut size = [0u8; 8];
        self.reader.read_exact(&mut size).map_err(io_err)?;
        let size = u64::from_le_bytes(size);
        record.check_size(name, size, &self.limits)?;

        let mut value = vec![0u8; size as usize];
        self.reader.read_exact(&mut value).map_err(io_err)?;

        let mut terminator = [0u8; 1];
        self.reader.read_exact(&mut terminator).map_err(io_err)?;
        if terminator[0] != b'\n' {
            return Err(DecodeError::MissingBinaryTerminator {
                record: record.number(),
                field: field.to_string(),
            });
        }
        Ok(value)
    }
}

impl<R: BufRead> Iterator for ExportReader<R> {
    type Item = Result<JournalEntry, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
