//! REST collaborators for composite operations.
//!
//! The waiter never builds HTTP requests. This module is the small client it
//! is usually paired with: a `reqwest` wrapper that expands path templates,
//! sets idempotency and precondition headers, retries transient failures,
//! and exposes [`StatusFetcher`](crate::StatusFetcher) implementations for
//! work-request and resource GET endpoints.

mod client;
mod fetcher;
mod request;
mod retry;
mod signer;

pub use client::{OperationResponse, RestClient};
pub use fetcher::{ResourceFetcher, WorkRequestFetcher};
pub use request::MutatingRequest;
pub use retry::RetryConfig;
pub use signer::{NoopSigner, RequestSigner, StaticHeaderSigner};

pub use reqwest::Method;

use thiserror::Error;

use crate::error::FetchError;

/// Work request tracking the operation started by a mutating call.
pub const OPC_WORK_REQUEST_ID: &str = "opc-work-request-id";
/// Service-assigned id of a request, for support cases.
pub const OPC_REQUEST_ID: &str = "opc-request-id";
/// Idempotency token for mutating calls.
pub const OPC_RETRY_TOKEN: &str = "opc-retry-token";
/// Optimistic concurrency precondition.
pub const IF_MATCH: &str = "if-match";

#[derive(Error, Debug)]
pub enum RestError {
    #[error("no endpoint configured")]
    MissingEndpoint,
    #[error("invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },
    #[error("missing value for path parameter '{0}'")]
    MissingPathParam(String),
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned HTTP {status}: {message}")]
    Service {
        status: u16,
        code: Option<String>,
        message: String,
        request_id: Option<String>,
    },
    #[error("failed to process {what} JSON: {source}")]
    Json {
        what: &'static str,
        source: serde_json::Error,
    },
}

pub type RestResult<T> = Result<T, RestError>;

impl From<RestError> for FetchError {
    fn from(value: RestError) -> Self {
        match value {
            RestError::Service {
                status: 404,
                message,
                ..
            } => Self::NotFound(message),
            RestError::Service {
                status,
                code,
                message,
                ..
            } => Self::Service {
                status,
                code,
                message,
            },
            RestError::Http(e) => Self::Transport(e),
            RestError::Json { what, source } => Self::Decode { what, source },
            other => Self::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_404_maps_to_not_found() {
        let err = FetchError::from(RestError::Service {
            status: 404,
            code: Some("NotAuthorizedOrNotFound".into()),
            message: "Authorization failed or requested resource not found".into(),
            request_id: None,
        });
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_rest_errors_keep_their_message() {
        let err = FetchError::from(RestError::MissingPathParam("deploymentId".into()));
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "missing value for path parameter 'deploymentId'"
        );

        let err = FetchError::from(RestError::Service {
            status: 409,
            code: Some("IncorrectState".into()),
            message: "busy".into(),
            request_id: Some("req-1".into()),
        });
        assert!(matches!(err, FetchError::Service { status: 409, .. }));
    }
}
