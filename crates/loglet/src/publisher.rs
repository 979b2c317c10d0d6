use journal_export::Cursor;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    sink::{Sink, SinkError},
    transform::EncodedMessage,
};

/// Pushes encoded messages into a [`Sink`] and reports the cursor of every accepted message.
pub struct Publisher<K> {
    sink: K,
}

impl<K: Sink> Publisher<K> {
    pub fn new(sink: K) -> Self {
        Self { sink }
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Runs until the input closes, cancellation fires or the sink fails.
    ///
    /// A cursor is forwarded on `delivered` only after the sink accepted its message. Once a
    /// send succeeded the cursor is handed off even if cancellation fires concurrently, so the
    /// committer learns about every confirmed delivery.
    pub async fn run(
        mut self,
        mut messages: mpsc::Receiver<EncodedMessage>,
        delivered: mpsc::Sender<Cursor>,
        cancel: CancellationToken,
    ) -> Result<(), SinkError> {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => {
                        debug!("publisher: input closed");
                        return Ok(());
                    }
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(cursor = %message.cursor, "publisher: send abandoned on shutdown");
                    return Ok(());
                }
                sent = self.sink.send(&message) => sent?,
            }
            trace!(cursor = %message.cursor, "publisher: delivered");

            // Not raced against cancellation: the committer keeps receiving until this sender
            // is dropped, or has dropped its receiver, so the handoff completes either way.
            if delivered.send(message.cursor).await.is_err() {
                return Ok(());
            }
        }
    }
}
