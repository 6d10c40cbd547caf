//! Subcommand execution and result rendering.

use anyhow::{bail, Context, Result};
use composite_ops::config::Config;
use composite_ops::models::WorkRequestStatus;
use composite_ops::rest::{
    MutatingRequest, OperationResponse, ResourceFetcher, RestClient, StaticHeaderSigner,
    WorkRequestFetcher,
};
use composite_ops::{
    CompositeOperation, OperationHandle, PartialResult, TargetStates, WaitError, WaitOutcome,
    Waiter,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use crate::{Cli, Commands, CommonArgs, InvokeArgs, TrackBy};

pub const EXIT_TIMED_OUT: u8 = 3;
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Completed,
    NotWaited,
    Gone,
    TimedOut,
    Failed,
    Cancelled,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NotWaited => "not-waited",
            Self::Gone => "gone",
            Self::TimedOut => "timed-out",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Final result of a subcommand: JSON for stdout plus an optional error line.
#[derive(Debug)]
pub struct Report {
    pub status: Status,
    pub body: Value,
    pub error: Option<String>,
}

impl Report {
    pub fn exit_code(&self) -> ExitCode {
        match self.status {
            Status::Completed | Status::NotWaited | Status::Gone => ExitCode::SUCCESS,
            Status::TimedOut => ExitCode::from(EXIT_TIMED_OUT),
            Status::Cancelled => ExitCode::from(EXIT_CANCELLED),
            Status::Failed => ExitCode::FAILURE,
        }
    }
}

/// Client, waiter and settings resolved from config file, environment and flags.
struct Session {
    client: RestClient,
    api_version: String,
    waiter: Waiter,
}

impl Session {
    async fn open(common: &CommonArgs, cancel: CancellationToken) -> Result<Self> {
        let mut config = match &common.config {
            Some(path) => Config::load(path)
                .await
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };
        apply_overrides(&mut config, common);

        let policy = config
            .polling
            .to_policy()
            .context("invalid polling settings")?;

        let mut signer = StaticHeaderSigner::new();
        for (name, value) in &common.headers {
            signer = signer
                .with_header(name, value)
                .with_context(|| format!("invalid --header {name}"))?;
        }
        let client = RestClient::from_config(&config.client)
            .context("failed to create REST client")?
            .with_signer(signer);
        log::info!("Using endpoint {}", client.endpoint());

        Ok(Self {
            client,
            api_version: config.client.api_version().to_string(),
            waiter: Waiter::new(policy).with_cancellation(cancel),
        })
    }
}

/// Flags and environment win over the config file.
fn apply_overrides(config: &mut Config, common: &CommonArgs) {
    let client = &mut config.client;
    if common.endpoint.is_some() {
        client.endpoint.clone_from(&common.endpoint);
    }
    if common.api_version.is_some() {
        client.api_version.clone_from(&common.api_version);
    }
    client.request_timeout_secs = common.request_timeout_secs.or(client.request_timeout_secs);
    client.retry.max_attempts = common.max_attempts.or(client.retry.max_attempts);

    let polling = &mut config.polling;
    polling.initial_interval_secs = common
        .initial_interval_secs
        .or(polling.initial_interval_secs);
    polling.max_interval_secs = common.max_interval_secs.or(polling.max_interval_secs);
    polling.max_wait_secs = common.max_wait_secs.or(polling.max_wait_secs);
}

/// Without explicit targets a work request is awaited until it is terminal.
fn work_request_targets(requested: TargetStates) -> TargetStates {
    if requested.is_empty() {
        TargetStates::new(WorkRequestStatus::TERMINAL.iter().map(WorkRequestStatus::as_str))
    } else {
        requested
    }
}

pub async fn execute(cli: Cli, cancel: CancellationToken) -> Result<Report> {
    let session = Session::open(&cli.common, cancel).await?;
    let targets = TargetStates::new(&cli.common.wait_for_state);

    match cli.command {
        Commands::WorkRequest { id } => {
            let targets = work_request_targets(targets);
            let fetcher = WorkRequestFetcher::new(session.client.clone(), &session.api_version);
            let result = session
                .waiter
                .wait_for_handle(&fetcher, OperationHandle::WorkRequest(id), &targets)
                .await;
            Ok(render(result, render_handle))
        }
        Commands::Resource {
            id,
            path,
            succeed_on_not_found,
        } => {
            if targets.is_empty() {
                bail!("--wait-for-state is required to wait on a resource");
            }
            let fetcher = ResourceFetcher::new(session.client.clone(), path);
            let result = session
                .waiter
                .clone()
                .succeed_on_not_found(succeed_on_not_found)
                .wait_for_handle(&fetcher, OperationHandle::Resource(id), &targets)
                .await;
            Ok(render(result, render_handle))
        }
        Commands::Invoke(args) => invoke(&session, args, &targets).await,
    }
}

async fn invoke(session: &Session, args: InvokeArgs, targets: &TargetStates) -> Result<Report> {
    let request = build_request(&args)?;
    let name = format!("{} {}", args.method, args.path);
    let waiter = session
        .waiter
        .clone()
        .succeed_on_not_found(args.succeed_on_not_found);
    let send = || session.client.send(&request);

    let report = match args.kind {
        TrackBy::WorkRequest => {
            let operation = CompositeOperation::work_request(
                name,
                WorkRequestFetcher::new(session.client.clone(), &session.api_version),
                |response: &OperationResponse| response.work_request_id().map(str::to_string),
            );
            render(waiter.run(&operation, send, targets).await, render_response)
        }
        TrackBy::Resource => {
            if !targets.is_empty() && args.resource_path.is_none() {
                bail!("--resource-path is required to wait on a resource");
            }
            let operation = CompositeOperation::resource(
                name,
                ResourceFetcher::new(
                    session.client.clone(),
                    args.resource_path.unwrap_or_default(),
                ),
                |response: &OperationResponse| response.resource_id().map(str::to_string),
            );
            render(waiter.run(&operation, send, targets).await, render_response)
        }
    };
    Ok(report)
}

fn build_request(args: &InvokeArgs) -> Result<MutatingRequest> {
    let mut request = MutatingRequest::new(args.method.clone(), &args.path);
    for (name, value) in &args.params {
        request = request.path_param(name, value);
    }
    for (name, value) in &args.query {
        request = request.query_param(name, value);
    }
    if let Some(body) = &args.body {
        let body: Value = serde_json::from_str(body).context("--body is not valid JSON")?;
        request = request.body(body);
    }
    if let Some(token) = &args.retry_token {
        request = request.retry_token(token);
    }
    if let Some(etag) = &args.if_match {
        request = request.if_match(etag);
    }
    // Surface a missing --param before anything is sent
    request.path().context("invalid --path")?;
    Ok(request)
}

fn render_handle(handle: &OperationHandle) -> Value {
    json!({ "kind": handle.kind(), "id": handle.id() })
}

fn render_response(response: &OperationResponse) -> Value {
    json!({
        "status": response.status,
        "opcRequestId": response.request_id(),
        "opcWorkRequestId": response.work_request_id(),
        "etag": response.etag(),
        "body": response.body,
    })
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        log::warn!("Failed to serialize snapshot, rendering null: {e}");
        Value::Null
    })
}

fn render<R, S: Serialize>(
    result: Result<WaitOutcome<R, S>, WaitError<R, S>>,
    render_result: fn(&R) -> Value,
) -> Report {
    match result {
        Ok(WaitOutcome::NotWaited(operation_result)) => Report {
            status: Status::NotWaited,
            body: json!({
                "outcome": Status::NotWaited.as_str(),
                "operationResult": render_result(&operation_result),
            }),
            error: None,
        },
        Ok(WaitOutcome::Completed {
            operation_result,
            snapshot,
            attempts,
        }) => Report {
            status: Status::Completed,
            body: json!({
                "outcome": Status::Completed.as_str(),
                "attempts": attempts,
                "operationResult": render_result(&operation_result),
                "snapshot": to_json(&snapshot),
            }),
            error: None,
        },
        Ok(WaitOutcome::Gone {
            operation_result,
            attempts,
        }) => Report {
            status: Status::Gone,
            body: json!({
                "outcome": Status::Gone.as_str(),
                "attempts": attempts,
                "operationResult": render_result(&operation_result),
            }),
            error: None,
        },
        Err(err) => {
            let status = match &err {
                WaitError::PollingTimedOut { .. } => Status::TimedOut,
                WaitError::Cancelled { .. } => Status::Cancelled,
                WaitError::MutationFailed { .. } | WaitError::PollingFailed { .. } => {
                    Status::Failed
                }
            };
            let error = format!("{err:#}");
            let mut body = json!({ "outcome": status.as_str(), "error": error });
            if let Some(partial) = err.partial() {
                body["partial"] = render_partial(partial, render_result);
            }
            Report {
                status,
                body,
                error: Some(error),
            }
        }
    }
}

fn render_partial<R, S: Serialize>(
    partial: &PartialResult<R, S>,
    render_result: fn(&R) -> Value,
) -> Value {
    json!({
        "operationResult": render_result(&partial.operation_result),
        "handle": partial.handle.as_ref().map(render_handle),
        "lastSnapshot": partial.last_snapshot.as_ref().map(to_json),
        "attempts": partial.attempts,
        "elapsedSecs": partial.elapsed.as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use composite_ops::models::WorkRequest;
    use composite_ops::FetchError;
    use std::time::Duration;

    fn work_request(status: &str) -> WorkRequest {
        serde_json::from_value(json!({"id": "wr-1", "status": status})).expect("valid")
    }

    #[test]
    fn test_render_completed() {
        let report = render(
            Ok(WaitOutcome::Completed {
                operation_result: OperationHandle::WorkRequest("wr-1".into()),
                snapshot: work_request("SUCCEEDED"),
                attempts: 2,
            }),
            render_handle,
        );
        assert_eq!(report.status, Status::Completed);
        assert_eq!(report.body["outcome"], "completed");
        assert_eq!(report.body["attempts"], 2);
        assert_eq!(report.body["snapshot"]["status"], "SUCCEEDED");
        assert_eq!(report.body["operationResult"]["kind"], "work-request");
        assert!(report.error.is_none());
    }

    #[test]
    fn test_render_timeout_includes_partial() {
        let result: Result<WaitOutcome<OperationHandle, WorkRequest>, _> =
            Err(WaitError::PollingTimedOut {
                partial: PartialResult {
                    operation_result: OperationHandle::WorkRequest("wr-1".into()),
                    handle: Some(OperationHandle::WorkRequest("wr-1".into())),
                    last_snapshot: Some(work_request("IN_PROGRESS")),
                    attempts: 4,
                    elapsed: Duration::from_secs(20),
                },
            });
        let report = render(result, render_handle);
        assert_eq!(report.status, Status::TimedOut);
        assert_eq!(report.body["outcome"], "timed-out");
        assert_eq!(report.body["partial"]["attempts"], 4);
        assert_eq!(report.body["partial"]["lastSnapshot"]["status"], "IN_PROGRESS");
        assert!(report.error.is_some());
    }

    #[test]
    fn test_render_failures() {
        let mutation: Result<WaitOutcome<OperationHandle, WorkRequest>, _> =
            Err(WaitError::MutationFailed {
                source: "409 Conflict".into(),
            });
        let report = render(mutation, render_handle);
        assert_eq!(report.status, Status::Failed);
        assert!(report.body.get("partial").is_none());

        let fetch: Result<WaitOutcome<OperationHandle, WorkRequest>, _> =
            Err(WaitError::PollingFailed {
                partial: PartialResult {
                    operation_result: OperationHandle::Resource("db-1".into()),
                    handle: Some(OperationHandle::Resource("db-1".into())),
                    last_snapshot: None,
                    attempts: 1,
                    elapsed: Duration::ZERO,
                },
                source: FetchError::NotFound("db-1".into()),
            });
        let report = render(fetch, render_handle);
        assert_eq!(report.status, Status::Failed);
        assert!(report.body["partial"]["lastSnapshot"].is_null());

        let cancelled: Result<WaitOutcome<OperationHandle, WorkRequest>, _> =
            Err(WaitError::Cancelled { partial: None });
        assert_eq!(render(cancelled, render_handle).status, Status::Cancelled);
    }

    #[test]
    fn test_work_request_defaults_to_terminal_statuses() {
        let targets = work_request_targets(TargetStates::empty());
        assert_eq!(targets.iter().collect::<Vec<_>>(), ["canceled", "failed", "succeeded"]);

        let requested = work_request_targets(TargetStates::new(["SUCCEEDED"]));
        assert_eq!(requested, TargetStates::new(["succeeded"]));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("snapshot holds a non-JSON value"))
        }
    }

    #[test]
    fn test_unserializable_snapshot_renders_null() {
        assert_eq!(to_json(&Unserializable), Value::Null);
        assert_eq!(to_json(&work_request("FAILED"))["status"], "FAILED");
    }
}
