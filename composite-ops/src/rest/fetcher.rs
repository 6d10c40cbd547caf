//! Status fetchers for work-request and resource GET endpoints.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::client::RestClient;
use super::request::expand_path;
use crate::error::FetchError;
use crate::models::{ResourceSnapshot, WorkRequest};
use crate::types::{CompletionKind, OperationHandle};
use crate::waiter::StatusFetcher;

const WORK_REQUEST_PATH: &str = "/{apiVersion}/workRequests/{workRequestId}";

/// Polls `GET /{api_version}/workRequests/{id}`.
#[derive(Debug, Clone)]
pub struct WorkRequestFetcher {
    client: RestClient,
    api_version: String,
}

impl WorkRequestFetcher {
    pub fn new(client: RestClient, api_version: impl Into<String>) -> Self {
        Self {
            client,
            api_version: api_version.into(),
        }
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }
}

#[async_trait]
impl StatusFetcher for WorkRequestFetcher {
    type Snapshot = WorkRequest;

    async fn fetch_status(&self, handle: &OperationHandle) -> Result<WorkRequest, FetchError> {
        let id = expect_kind(handle, CompletionKind::WorkRequest)?;
        let params = BTreeMap::from([
            ("apiVersion".to_string(), self.api_version.clone()),
            ("workRequestId".to_string(), id.to_string()),
        ]);
        let path = expand_path(WORK_REQUEST_PATH, &params)?;
        let work_request: WorkRequest = self.client.get(&path, "work request").await?;
        if work_request.id != id {
            log::warn!(
                "Work request response id '{}' does not match requested '{id}'",
                work_request.id
            );
        }
        Ok(work_request)
    }
}

/// Polls a resource's own GET endpoint.
///
/// `path_template` must contain an `{id}` placeholder, for example
/// `/20200407/deployments/{id}`.
#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    client: RestClient,
    path_template: String,
}

impl ResourceFetcher {
    pub fn new(client: RestClient, path_template: impl Into<String>) -> Self {
        Self {
            client,
            path_template: path_template.into(),
        }
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }
}

#[async_trait]
impl StatusFetcher for ResourceFetcher {
    type Snapshot = ResourceSnapshot;

    async fn fetch_status(&self, handle: &OperationHandle) -> Result<ResourceSnapshot, FetchError> {
        let id = expect_kind(handle, CompletionKind::Resource)?;
        let params = BTreeMap::from([("id".to_string(), id.to_string())]);
        let path = expand_path(&self.path_template, &params)?;
        Ok(self.client.get(&path, "resource").await?)
    }
}

fn expect_kind(handle: &OperationHandle, kind: CompletionKind) -> Result<&str, FetchError> {
    if handle.kind() == kind {
        Ok(handle.id())
    } else {
        Err(FetchError::other(format!(
            "{handle} cannot be polled as {kind:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wrong_handle_kind_is_rejected_without_request() {
        // Port 9 (discard) is never contacted: the kind check fails first.
        let client = RestClient::new("http://127.0.0.1:9").expect("valid endpoint");
        let fetcher = WorkRequestFetcher::new(client.clone(), "20200407");
        let err = fetcher
            .fetch_status(&OperationHandle::Resource("db-1".into()))
            .await
            .expect_err("resource handle is not a work request");
        assert!(err.to_string().contains("resource db-1"));

        let fetcher = ResourceFetcher::new(client, "/20200407/deployments/{id}");
        assert_eq!(fetcher.path_template(), "/20200407/deployments/{id}");
        let err = fetcher
            .fetch_status(&OperationHandle::WorkRequest("wr-1".into()))
            .await
            .expect_err("work request handle is not a resource");
        assert!(!err.is_not_found());
    }
}
