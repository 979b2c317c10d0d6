#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use journal_export::write_record;
use loglet::{Cursor, EncodedMessage, Sink, SinkError};
use tokio::sync::mpsc;

pub const BASE_MICROS: u64 = 1_500_000_000_000_000;

/// One export-format record with a cursor and a realtime timestamp.
pub fn export_record(cursor: &str, offset_secs: u64, fields: &[(&str, &str)]) -> Vec<u8> {
    let timestamp = (BASE_MICROS + offset_secs * 1_000_000).to_string();
    let mut pairs = vec![
        ("__CURSOR", cursor),
        ("__REALTIME_TIMESTAMP", timestamp.as_str()),
    ];
    pairs.extend_from_slice(fields);

    let mut out = Vec::new();
    write_record(&mut out, pairs);
    out
}

/// `count` records `c0..c{count}`; even ones carry `KEEP=yes`, odd ones `KEEP=no`.
pub fn alternating_records(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..count {
        let keep = if i % 2 == 0 { "yes" } else { "no" };
        let message = format!("message {i}");
        out.extend(export_record(
            &format!("c{i}"),
            i as u64,
            &[("KEEP", keep), ("MESSAGE", message.as_str())],
        ));
    }
    out
}

/// Sink that keeps every message and reports each accepted cursor on a channel.
#[derive(Clone)]
pub struct RecordingSink {
    delivered: Arc<Mutex<Vec<EncodedMessage>>>,
    accepted: mpsc::UnboundedSender<Cursor>,
}

impl RecordingSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Cursor>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let sink = Self {
            delivered: Arc::new(Mutex::new(Vec::new())),
            accepted,
        };
        (sink, rx)
    }

    pub fn delivered(&self) -> Vec<EncodedMessage> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_cursors(&self) -> Vec<String> {
        self.delivered()
            .into_iter()
            .map(|message| message.cursor.into_string())
            .collect()
    }
}

impl Sink for RecordingSink {
    async fn send(&mut self, message: &EncodedMessage) -> Result<(), SinkError> {
        self.delivered.lock().unwrap().push(message.clone());
        let _ = self.accepted.send(message.cursor.clone());
        Ok(())
    }
}

/// Sink that panics on the first message.
pub struct PanickingSink;

impl Sink for PanickingSink {
    async fn send(&mut self, _message: &EncodedMessage) -> Result<(), SinkError> {
        panic!("sink exploded");
    }
}

pub fn write_executable(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }
    path
}
