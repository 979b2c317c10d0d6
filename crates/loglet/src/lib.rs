#![forbid(unsafe_code)]
//! Journal forwarding agent.
//!
//! loglet follows the systemd journal in its export format, filters and enriches every entry,
//! publishes it to a sink (Kafka in production) and periodically persists the cursor of the
//! last entry the sink accepted. A restart resumes right after that cursor, so entries are
//! delivered at least once.
//!
//! The pieces are usable on their own; [`Pipeline`] wires them together.

pub mod cli;
pub mod committer;
pub mod config;
pub mod cursor;
mod error;
pub mod filter;
pub mod follower;
pub mod pipeline;
mod process;
pub mod publisher;
pub mod sink;
pub mod transform;

pub use committer::Committer;
pub use config::{ConfigError, LogletConfig};
pub use cursor::{CursorError, CursorFile, CursorStore};
pub use error::PipelineError;
pub use filter::{EntryFilter, FilterError, FilterSemantics};
pub use follower::{
    AttachedSource, ExportSource, FollowError, Follower, Input, InputMode, JournalctlSource,
};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use publisher::Publisher;
pub use sink::{ConfiguredSink, DiscardSink, Sink, SinkError, SinkKind, WriterSink};
pub use transform::{EncodedMessage, Enrichment, TransformError, Transformer};

pub use journal_export::{Cursor, JournalEntry};
