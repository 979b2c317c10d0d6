use std::{sync::Arc, time::Duration};

use journal_export::Cursor;
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::cursor::{CursorError, CursorStore};

pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_secs(5);
/// Shortest commit period; a zero period cannot drive a timer.
pub const MIN_COMMIT_INTERVAL: Duration = Duration::from_millis(1);

/// Periodically persists the newest delivered cursor.
///
/// Only the latest cursor is kept between ticks. Every cursor received has already been
/// accepted by the sink, so whatever is persisted never runs ahead of confirmed delivery.
pub struct Committer<S> {
    store: Arc<S>,
    interval: Duration,
    latest: Option<Cursor>,
    committed: Option<Cursor>,
}

impl<S: CursorStore> Committer<S> {
    /// `initial` is the cursor the pipeline resumed from; it counts as already committed.
    pub fn new(store: Arc<S>, initial: Option<Cursor>) -> Self {
        Self {
            store,
            interval: DEFAULT_COMMIT_INTERVAL,
            latest: initial.clone(),
            committed: initial,
        }
    }

    /// Sets the commit period. Periods below [`MIN_COMMIT_INTERVAL`] are raised to it.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_COMMIT_INTERVAL);
        self
    }

    /// Consumes delivered cursors until the delivery stream closes.
    ///
    /// After cancellation no further ticks happen, but cursors the publisher already confirmed
    /// are still drained until it drops its sender; the newest of them is committed once on
    /// the way out. The same final commit runs when the stream ends on its own.
    pub async fn run(
        mut self,
        mut delivered: mpsc::Receiver<Cursor>,
        cancel: CancellationToken,
    ) -> Result<(), CursorError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cursor = delivered.recv() => match cursor {
                    Some(cursor) => self.latest = Some(cursor),
                    None => {
                        debug!("committer: delivery stream closed");
                        return self.flush().await;
                    }
                },
                _ = ticker.tick() => self.flush().await?,
            }
        }

        while let Some(cursor) = delivered.recv().await {
            self.latest = Some(cursor);
        }
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), CursorError> {
        let Some(cursor) = self.latest.clone() else {
            return Ok(());
        };
        if self.committed.as_ref() == Some(&cursor) {
            trace!(cursor = %cursor, "committer: cursor unchanged");
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let pending = cursor.clone();
        tokio::task::spawn_blocking(move || store.commit(&pending)).await??;
        self.committed = Some(cursor);
        Ok(())
    }
}
