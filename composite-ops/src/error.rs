//! Error types shared across the waiter, models and REST collaborator layer.

use std::time::Duration;
use thiserror::Error;

use crate::types::PartialResult;

/// Boxed error used where the caller supplies its own error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a status-fetch collaborator.
///
/// Transport retries are the collaborator's business; by the time an error
/// surfaces here it is considered unrecoverable for the current wait.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The tracked work request or resource does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {message}")]
    Service {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be decoded as the expected snapshot.
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        source: serde_json::Error,
    },

    /// The mutating call's result carried no usable operation handle.
    #[error("no operation handle: {0}")]
    MissingHandle(String),

    #[error(transparent)]
    Other(BoxError),
}

impl FetchError {
    /// Wrap an arbitrary collaborator error.
    pub fn other(error: impl Into<BoxError>) -> Self {
        Self::Other(error.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Invalid polling policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("initial interval {initial:?} exceeds maximum interval {max:?}")]
    InitialExceedsMax { initial: Duration, max: Duration },
}

/// Terminal failure of a composite operation.
///
/// Every variant after [`WaitError::MutationFailed`] carries the partial
/// result gathered so far; the underlying cause, when there is one, is kept
/// as the error source.
#[derive(Debug, Error)]
pub enum WaitError<R, S> {
    /// The mutating call itself failed; no handle was obtained.
    #[error("mutating call failed: {source}")]
    MutationFailed { source: BoxError },

    /// The total wait elapsed before a target state was observed.
    #[error("timed out waiting for {partial}")]
    PollingTimedOut { partial: PartialResult<R, S> },

    /// Handle extraction or a status fetch failed unrecoverably.
    #[error("polling {partial} failed: {source}")]
    PollingFailed {
        partial: PartialResult<R, S>,
        source: FetchError,
    },

    /// The caller cancelled the wait. `partial` is `None` when cancellation
    /// happened before the mutating call returned.
    #[error("cancelled while waiting{}", cancelled_context(.partial))]
    Cancelled { partial: Option<PartialResult<R, S>> },
}

fn cancelled_context<R, S>(partial: &Option<PartialResult<R, S>>) -> String {
    match partial {
        Some(partial) => format!(" for {partial}"),
        None => " for the mutating call".to_string(),
    }
}

impl<R, S> WaitError<R, S> {
    /// Partial result carried by this failure, if any.
    pub fn partial(&self) -> Option<&PartialResult<R, S>> {
        match self {
            Self::MutationFailed { .. } => None,
            Self::PollingTimedOut { partial } | Self::PollingFailed { partial, .. } => {
                Some(partial)
            }
            Self::Cancelled { partial } => partial.as_ref(),
        }
    }

    pub fn into_partial(self) -> Option<PartialResult<R, S>> {
        match self {
            Self::MutationFailed { .. } => None,
            Self::PollingTimedOut { partial } | Self::PollingFailed { partial, .. } => {
                Some(partial)
            }
            Self::Cancelled { partial } => partial,
        }
    }

    /// The mutating call's response, when the failure happened after it.
    pub fn operation_result(&self) -> Option<&R> {
        self.partial().map(|p| &p.operation_result)
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::PollingTimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
