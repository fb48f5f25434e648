//! Target source error types.

use thiserror::Error;

/// Errors that can occur while setting up a target source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to watch target file: {0}")]
    Watch(#[from] notify::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;
