use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("backend request failed: {0}")]
    Backend(#[from] anyhow::Error),
    #[error("message {0} is not available")]
    NotFound(String),
    #[error("request was interrupted before completing")]
    Interrupted,
}

#[derive(Debug, Clone, Error)]
pub enum JumpError {
    #[error("a jump is already in progress")]
    InProgress,
    #[error("no message to jump to")]
    NoTarget,
    #[error("failed to load the page around the target: {0}")]
    Load(Arc<DataSourceError>),
    #[error("message {0} was not part of the loaded page")]
    NotFound(String),
}
