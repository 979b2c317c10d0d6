#![forbid(unsafe_code)]
//! Decoding primitives for the systemd journal "export" format.
//!
//! The format is a text/binary hybrid: every record is a run of field lines followed by a blank
//! line. A field line is either `NAME=value\n` or, for values that are not plain text,
//! `NAME\n<u64 little-endian length><bytes>\n`. See
//! <https://systemd.io/JOURNAL_EXPORT_FORMATS/>.
//!
//! This crate provides:
//! - [`ExportReader`], a blocking iterator over any [`std::io::BufRead`].
//! - [`AsyncExportDecoder`] (feature `tokio`), the same decoder over `AsyncBufRead`.
//! - [`JournalEntry`] and the opaque [`Cursor`] position token every record must carry.

mod config;
mod encode;
mod entry;
mod error;
mod reader;

pub use config::DecodeLimits;
pub use encode::{write_field, write_record};
pub use entry::{Cursor, Fields, JournalEntry, CURSOR_FIELD};
pub use error::DecodeError;
pub use reader::ExportReader;

#[cfg(feature = "tokio")]
pub use reader::AsyncExportDecoder;
