//! Wiring of the five stages and coordinated shutdown.
//!
//! ```text
//! follower -> filter -> transformer -> publisher -> committer
//! ```
//!
//! Every handoff is a single-slot channel. All stages share one [`CancellationToken`]; it is
//! cancelled when the shutdown future resolves or the first stage fails, and the pipeline
//! returns once every stage has finished.

use std::{future::Future, sync::Arc, time::Duration};

use journal_export::DecodeLimits;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    committer::{Committer, DEFAULT_COMMIT_INTERVAL, MIN_COMMIT_INTERVAL},
    config::LogletConfig,
    cursor::{CursorFile, CursorStore},
    error::PipelineError,
    filter::EntryFilter,
    follower::{ExportSource, Follower, Input},
    publisher::Publisher,
    sink::{ConfiguredSink, Sink},
    transform::Transformer,
};

const STAGE_CAPACITY: usize = 1;

type StageResult = (&'static str, Result<(), PipelineError>);

/// A fully constructed pipeline, ready to run.
pub struct Pipeline<S, K, C> {
    source: S,
    filter: EntryFilter,
    transformer: Transformer,
    sink: K,
    store: Arc<C>,
    commit_interval: Duration,
    limits: DecodeLimits,
}

impl<S, K, C> Pipeline<S, K, C>
where
    S: ExportSource,
    K: Sink,
    C: CursorStore,
{
    pub fn builder(source: S, sink: K, store: C) -> PipelineBuilder<S, K, C> {
        PipelineBuilder {
            source,
            sink,
            store: Arc::new(store),
            filter: EntryFilter::default(),
            transformer: Transformer::default(),
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            limits: DecodeLimits::default(),
        }
    }

    /// Runs until `shutdown` resolves, the input ends, or a stage fails.
    ///
    /// Returns the first stage error; errors reported by other stages while draining are only
    /// logged.
    pub async fn run<F>(self, shutdown: F) -> Result<(), PipelineError>
    where
        F: Future<Output = ()> + Send,
    {
        let cursor = self.store.load()?;
        info!(cursor = ?cursor.as_ref().map(|c| c.as_str()), "started");

        let cancel = CancellationToken::new();
        let _stop_on_drop = cancel.clone().drop_guard();

        let (entry_tx, entry_rx) = mpsc::channel(STAGE_CAPACITY);
        let (accepted_tx, accepted_rx) = mpsc::channel(STAGE_CAPACITY);
        let (encoded_tx, encoded_rx) = mpsc::channel(STAGE_CAPACITY);
        let (delivered_tx, delivered_rx) = mpsc::channel(STAGE_CAPACITY);

        let mut stages = JoinSet::new();

        let follower = Follower::new(self.source, cursor.clone()).limits(self.limits);
        let token = cancel.clone();
        spawn_stage(&mut stages, "follower", async move {
            follower.run(entry_tx, token).await.map_err(Into::into)
        });

        let filter = self.filter;
        let token = cancel.clone();
        spawn_stage(&mut stages, "filter", async move {
            filter.run(entry_rx, accepted_tx, token).await;
            Ok(())
        });

        let transformer = self.transformer;
        let token = cancel.clone();
        spawn_stage(&mut stages, "transformer", async move {
            transformer
                .run(accepted_rx, encoded_tx, token)
                .await
                .map_err(Into::into)
        });

        let publisher = Publisher::new(self.sink);
        let token = cancel.clone();
        spawn_stage(&mut stages, "publisher", async move {
            publisher
                .run(encoded_rx, delivered_tx, token)
                .await
                .map_err(Into::into)
        });

        let committer = Committer::new(self.store, cursor).interval(self.commit_interval);
        let token = cancel.clone();
        spawn_stage(&mut stages, "committer", async move {
            committer.run(delivered_rx, token).await.map_err(Into::into)
        });

        tokio::pin!(shutdown);
        let mut first_error = None;

        loop {
            tokio::select! {
                _ = &mut shutdown, if !cancel.is_cancelled() => {
                    info!("shutdown requested, draining pipeline");
                    cancel.cancel();
                }
                joined = stages.join_next() => {
                    let (stage, result) = match joined {
                        Some(Ok(report)) => report,
                        Some(Err(err)) => {
                            error!(error = %err, "stage supervisor failed");
                            continue;
                        }
                        None => break,
                    };
                    match result {
                        Ok(()) => debug!(stage, "stage finished"),
                        Err(err) if first_error.is_none() => {
                            error!(stage, error = %err, "stage failed, draining pipeline");
                            first_error = Some(err);
                            cancel.cancel();
                        }
                        Err(err) => error!(stage, error = %err, "stage failed while draining"),
                    }
                }
            }
        }

        info!(failed = first_error.is_some(), "exiting");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn spawn_stage<F>(stages: &mut JoinSet<StageResult>, stage: &'static str, task: F)
where
    F: Future<Output = Result<(), PipelineError>> + Send + 'static,
{
    let handle = tokio::spawn(task);
    stages.spawn(async move {
        let result = match handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(PipelineError::StagePanicked { stage }),
            Err(_) => Ok(()),
        };
        (stage, result)
    });
}

impl Pipeline<Input, ConfiguredSink, CursorFile> {
    /// Builds the production pipeline: stdin or journalctl, the configured sink and the cursor
    /// file. Invalid filters or sink settings fail here, before anything runs.
    pub fn from_config(config: &LogletConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let filter = EntryFilter::new(&config.include, &config.exclude)?
            .semantics(config.filter_semantics);

        let mut transformer = Transformer::new()
            .default_fields(config.default_fields.clone())
            .override_fields(config.override_fields.clone());
        if let Some(field) = &config.partition_key_field {
            transformer = transformer.key_field(field.clone());
        }

        let sink = ConfiguredSink::build(config.sink, &config.kafka())?;
        let source = Input::from_mode(config.input, &config.journalctl)?;
        let store = CursorFile::new(&config.cursor_file);

        Ok(Pipeline::builder(source, sink, store)
            .filter(filter)
            .transformer(transformer)
            .commit_interval(config.commit_interval())
            .limits(config.decode_limits())
            .build())
    }
}

pub struct PipelineBuilder<S, K, C> {
    source: S,
    sink: K,
    store: Arc<C>,
    filter: EntryFilter,
    transformer: Transformer,
    commit_interval: Duration,
    limits: DecodeLimits,
}

impl<S, K, C> PipelineBuilder<S, K, C> {
    pub fn filter(mut self, filter: EntryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = transformer;
        self
    }

    /// Periods below [`MIN_COMMIT_INTERVAL`] are raised to it.
    pub fn commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval.max(MIN_COMMIT_INTERVAL);
        self
    }

    pub fn limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> Pipeline<S, K, C> {
        Pipeline {
            source: self.source,
            filter: self.filter,
            transformer: self.transformer,
            sink: self.sink,
            store: self.store,
            commit_interval: self.commit_interval,
            limits: self.limits,
        }
    }
}
