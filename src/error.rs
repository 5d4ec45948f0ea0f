use std::sync::Arc;

use thiserror::Error;

/// Failure observed by a caller of [`crate::Loader::load`].
///
/// Errors produced by the `BatchFunction` are shared between every waiter of the affected key or
/// batch, hence the `Arc`.
#[derive(Debug, Error)]
pub enum LoadError<E> {
    /// The key was null (`None`). Reported before any batch work is scheduled.
    #[error("loader key must not be null")]
    InvalidKey,
    /// The batch function failed outright; every key in that batch carries this error.
    #[error("batch function failed: {0}")]
    BatchFetch(Arc<E>),
    /// The batch function broke the one-result-per-key contract.
    #[error("batch function returned {actual} results for {expected} keys")]
    MalformedBatchResult { expected: usize, actual: usize },
    /// The batch function reported a failure for this key only.
    #[error("failed to load key: {0}")]
    PerKey(Arc<E>),
    /// The loader worker is gone, so the request can never be answered.
    #[error("loader worker is no longer running")]
    Closed,
}

// Manual implementation is used to omit applying unnecessary Clone bounds.
impl<E> Clone for LoadError<E> {
    fn clone(&self) -> Self {
        match self {
            LoadError::InvalidKey => LoadError::InvalidKey,
            LoadError::BatchFetch(e) => LoadError::BatchFetch(Arc::clone(e)),
            LoadError::MalformedBatchResult { expected, actual } => {
                LoadError::MalformedBatchResult { expected: *expected, actual: *actual }
            }
            LoadError::PerKey(e) => LoadError::PerKey(Arc::clone(e)),
            LoadError::Closed => LoadError::Closed,
        }
    }
}

impl<E> LoadError<E> {
    /// Returns the batch function's own error, if this failure carries one.
    pub fn cause(&self) -> Option<&E> {
        match self {
            LoadError::BatchFetch(e) | LoadError::PerKey(e) => Some(e),
            _ => None,
        }
    }
}
