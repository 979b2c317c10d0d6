use thiserror::Error;

use crate::{
    config::ConfigError, cursor::CursorError, filter::FilterError, follower::FollowError,
    sink::SinkError, transform::TransformError,
};

/// Reason the pipeline failed, either at startup or from the first stage that broke.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Follow(#[from] FollowError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("{stage} stage panicked")]
    StagePanicked { stage: &'static str },
}
