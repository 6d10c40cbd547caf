//! Operation descriptors pairing a completion kind with its status fetcher.

use async_trait::async_trait;
use std::fmt;

use crate::error::FetchError;
use crate::types::{CompletionKind, OperationHandle, StateSnapshot};

/// Read side of a composite operation: get-work-request or get-resource.
///
/// Implementations apply their own transport retry policy; the waiter calls
/// `fetch_status` once per poll and treats an error as final.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    type Snapshot: StateSnapshot + Send;

    async fn fetch_status(&self, handle: &OperationHandle) -> Result<Self::Snapshot, FetchError>;
}

#[async_trait]
impl<T: StatusFetcher + ?Sized> StatusFetcher for std::sync::Arc<T> {
    type Snapshot = T::Snapshot;

    async fn fetch_status(&self, handle: &OperationHandle) -> Result<Self::Snapshot, FetchError> {
        (**self).fetch_status(handle).await
    }
}

/// Static description of one asynchronous endpoint.
///
/// The completion kind is chosen once per operation. `extract_id` pulls the
/// work request id (usually from the `opc-work-request-id` header) or the
/// resource id from the mutating call's result.
pub struct CompositeOperation<R, F> {
    name: String,
    kind: CompletionKind,
    extract_id: fn(&R) -> Option<String>,
    fetcher: F,
}

impl<R, F: StatusFetcher> CompositeOperation<R, F> {
    /// An operation tracked through a separate work request.
    pub fn work_request(
        name: impl Into<String>,
        fetcher: F,
        extract_id: fn(&R) -> Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: CompletionKind::WorkRequest,
            extract_id,
            fetcher,
        }
    }

    /// An operation whose resource reports its own lifecycle state.
    pub fn resource(
        name: impl Into<String>,
        fetcher: F,
        extract_id: fn(&R) -> Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: CompletionKind::Resource,
            extract_id,
            fetcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CompletionKind {
        self.kind
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn extract_handle(&self, result: &R) -> Option<OperationHandle> {
        (self.extract_id)(result).map(|id| self.kind.handle(id))
    }
}

impl<R, F> fmt::Debug for CompositeOperation<R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeOperation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
