//! Wait-for-state loop behind every composite operation.
//!
//! A composite operation issues one mutating call, pulls an
//! [`OperationHandle`] out of its result and then polls a status endpoint
//! until the fetched snapshot reaches a target state. The loop moves through
//! `NotStarted -> Mutated -> Polling -> {Completed | TimedOut | Failed}`;
//! polling is skipped entirely when the target set is empty.
//!
//! The waiter only governs the polling cadence. Transport retries belong to
//! the status-fetch collaborator, so a fetch error is terminal here.
//!
//! # Example
//!
//! ```no_run
//! use composite_ops::{FetchError, OperationHandle, PollingPolicy, TargetStates, Waiter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # async fn start_deployment() -> Result<String, std::io::Error> { Ok("wr-1".into()) }
//! # async fn get_work_request(_: OperationHandle) -> Result<composite_ops::models::WorkRequest, FetchError> { unimplemented!() }
//! let targets = TargetStates::new(["SUCCEEDED", "FAILED"]);
//! let waiter = Waiter::new(PollingPolicy::default());
//! let outcome = waiter
//!     .wait_for_completion(
//!         || start_deployment(),
//!         |wr_id: &String| Some(OperationHandle::WorkRequest(wr_id.clone())),
//!         get_work_request,
//!         |snapshot| targets.matches(snapshot),
//!         &targets,
//!     )
//!     .await?;
//! println!("finished after {} polls", outcome.attempts());
//! # Ok(())
//! # }
//! ```

mod composite;

pub use composite::{CompositeOperation, StatusFetcher};

use std::convert::Infallible;
use std::future::Future;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, FetchError, WaitError};
use crate::policy::PollingPolicy;
use crate::types::{OperationHandle, PartialResult, StateSnapshot, TargetStates, WaitOutcome};

/// Runs mutate-then-poll sequences under one polling policy.
///
/// A waiter holds no per-wait state; one instance can drive any number of
/// concurrent waits against independent handles.
#[derive(Debug, Clone, Default)]
pub struct Waiter {
    policy: PollingPolicy,
    cancellation: Option<CancellationToken>,
    succeed_on_not_found: bool,
}

impl Waiter {
    pub fn new(policy: PollingPolicy) -> Self {
        Self {
            policy,
            cancellation: None,
            succeed_on_not_found: false,
        }
    }

    /// Abort waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Treat a not-found status fetch as completion, for deletions.
    pub fn succeed_on_not_found(mut self, succeed: bool) -> Self {
        self.succeed_on_not_found = succeed;
        self
    }

    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    /// Invoke `mutating_call` once, then poll `fetch_status` until
    /// `is_target_state` holds for a snapshot.
    ///
    /// With an empty `target_states` the mutating call's result is returned
    /// unchanged and nothing is polled. Fetches are strictly sequential and
    /// each one is bounded by the remaining total wait.
    pub async fn wait_for_completion<R, S, E, M, MFut, X, F, FFut, P>(
        &self,
        mutating_call: M,
        extract_handle: X,
        mut fetch_status: F,
        is_target_state: P,
        target_states: &TargetStates,
    ) -> Result<WaitOutcome<R, S>, WaitError<R, S>>
    where
        M: FnOnce() -> MFut,
        MFut: Future<Output = Result<R, E>>,
        E: Into<BoxError>,
        X: FnOnce(&R) -> Option<OperationHandle>,
        F: FnMut(OperationHandle) -> FFut,
        FFut: Future<Output = Result<S, FetchError>>,
        S: StateSnapshot,
        P: Fn(&S) -> bool,
    {
        let token = self.cancellation.as_ref();
        if token.is_some_and(CancellationToken::is_cancelled) {
            return Err(WaitError::Cancelled { partial: None });
        }

        let mutation = tokio::select! {
            biased;
            () = cancelled(token) => None,
            result = mutating_call() => Some(result),
        };
        let operation_result = match mutation {
            None => return Err(WaitError::Cancelled { partial: None }),
            Some(Err(e)) => {
                let source: BoxError = e.into();
                log::debug!("Mutating call failed: {source}");
                return Err(WaitError::MutationFailed { source });
            }
            Some(Ok(result)) => result,
        };

        if target_states.is_empty() {
            log::debug!("No target states requested, returning mutating call result");
            return Ok(WaitOutcome::NotWaited(operation_result));
        }

        let started = Instant::now();
        let Some(handle) = extract_handle(&operation_result) else {
            return Err(WaitError::PollingFailed {
                partial: PartialResult {
                    operation_result,
                    handle: None,
                    last_snapshot: None,
                    attempts: 0,
                    elapsed: started.elapsed(),
                },
                source: FetchError::MissingHandle(
                    "mutating call result did not identify a work request or resource".into(),
                ),
            });
        };

        log::debug!("Waiting for {handle} to reach one of {target_states}");
        let deadline = started + self.policy.max_total_wait();
        let mut backoff = self.policy.backoff();
        let mut poll = PollState {
            handle,
            last_snapshot: None,
            attempts: 0,
            started,
        };

        loop {
            poll.attempts += 1;
            let fetched = tokio::select! {
                biased;
                () = cancelled(token) => None,
                result = timeout_at(deadline, fetch_status(poll.handle.clone())) => Some(result),
            };

            match fetched {
                None => {
                    log::debug!("Wait for {} cancelled during fetch", poll.handle);
                    return Err(WaitError::Cancelled {
                        partial: Some(poll.into_partial(operation_result)),
                    });
                }
                Some(Err(_elapsed)) => {
                    log::warn!(
                        "Status fetch for {} outlasted the {:?} wait",
                        poll.handle,
                        self.policy.max_total_wait()
                    );
                    return Err(WaitError::PollingTimedOut {
                        partial: poll.into_partial(operation_result),
                    });
                }
                Some(Ok(Err(e))) if e.is_not_found() && self.succeed_on_not_found => {
                    log::debug!("{} no longer exists, treating as complete", poll.handle);
                    return Ok(WaitOutcome::Gone {
                        operation_result,
                        attempts: poll.attempts,
                    });
                }
                Some(Ok(Err(source))) => {
                    log::debug!("Status fetch for {} failed: {source}", poll.handle);
                    return Err(WaitError::PollingFailed {
                        partial: poll.into_partial(operation_result),
                        source,
                    });
                }
                Some(Ok(Ok(snapshot))) => {
                    if is_target_state(&snapshot) {
                        log::debug!(
                            "{} reached {:?} after {} attempts",
                            poll.handle,
                            snapshot.state(),
                            poll.attempts
                        );
                        return Ok(WaitOutcome::Completed {
                            operation_result,
                            snapshot,
                            attempts: poll.attempts,
                        });
                    }
                    log::debug!(
                        "{} is {:?} (attempt {})",
                        poll.handle,
                        snapshot.state(),
                        poll.attempts
                    );
                    poll.last_snapshot = Some(snapshot);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let delay = backoff.next_delay(remaining);
            let slept = tokio::select! {
                biased;
                () = cancelled(token) => false,
                () = sleep(delay) => true,
            };
            if !slept {
                log::debug!("Wait for {} cancelled between polls", poll.handle);
                return Err(WaitError::Cancelled {
                    partial: Some(poll.into_partial(operation_result)),
                });
            }
            // A fetch started at the deadline could never finish in time
            if Instant::now() >= deadline {
                log::warn!(
                    "Gave up on {} after {:?}",
                    poll.handle,
                    self.policy.max_total_wait()
                );
                return Err(WaitError::PollingTimedOut {
                    partial: poll.into_partial(operation_result),
                });
            }
        }
    }

    /// Run a composite operation described by `operation`.
    ///
    /// Handle extraction, the status fetcher and the completion kind all come
    /// from the descriptor; a snapshot matches when its state is in
    /// `target_states`.
    pub async fn run<R, F, M, MFut, E>(
        &self,
        operation: &CompositeOperation<R, F>,
        mutating_call: M,
        target_states: &TargetStates,
    ) -> Result<WaitOutcome<R, F::Snapshot>, WaitError<R, F::Snapshot>>
    where
        F: StatusFetcher,
        M: FnOnce() -> MFut,
        MFut: Future<Output = Result<R, E>>,
        E: Into<BoxError>,
    {
        log::debug!(
            "Running {} ({:?} completion)",
            operation.name(),
            operation.kind()
        );
        let fetcher = operation.fetcher();
        self.wait_for_completion(
            mutating_call,
            |result| operation.extract_handle(result),
            move |handle| async move { fetcher.fetch_status(&handle).await },
            |snapshot| target_states.matches(snapshot),
            target_states,
        )
        .await
    }

    /// Wait on a handle obtained elsewhere, without a mutating call.
    pub async fn wait_for_handle<F>(
        &self,
        fetcher: &F,
        handle: OperationHandle,
        target_states: &TargetStates,
    ) -> Result<WaitOutcome<OperationHandle, F::Snapshot>, WaitError<OperationHandle, F::Snapshot>>
    where
        F: StatusFetcher,
    {
        self.wait_for_completion(
            || async move { Ok::<_, Infallible>(handle) },
            |handle: &OperationHandle| Some(handle.clone()),
            move |handle| async move { fetcher.fetch_status(&handle).await },
            |snapshot| target_states.matches(snapshot),
            target_states,
        )
        .await
    }
}

/// Bookkeeping for one polling phase.
struct PollState<S> {
    handle: OperationHandle,
    last_snapshot: Option<S>,
    attempts: u32,
    started: Instant,
}

impl<S> PollState<S> {
    fn into_partial<R>(self, operation_result: R) -> PartialResult<R, S> {
        PartialResult {
            operation_result,
            handle: Some(self.handle),
            last_snapshot: self.last_snapshot,
            attempts: self.attempts,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Resolve on cancellation, or never when there is no token.
async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CompletionKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Snap(&'static str);

    impl StateSnapshot for Snap {
        fn state(&self) -> Option<&str> {
            Some(self.0)
        }
    }

    fn policy() -> PollingPolicy {
        PollingPolicy::new(Duration::from_secs(4), Duration::from_secs(30)).expect("valid policy")
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_handle_reports_polling_failed() {
        let fetches = Arc::new(AtomicU32::new(0));
        let counter = fetches.clone();
        let targets = TargetStates::new(["SUCCEEDED"]);

        let result = Waiter::new(policy())
            .wait_for_completion(
                || async { Ok::<_, Infallible>("no header") },
                |_| None,
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Snap("SUCCEEDED")) }
                },
                |s: &Snap| targets.matches(s),
                &targets,
            )
            .await;

        match result {
            Err(WaitError::PollingFailed { partial, source }) => {
                assert_eq!(partial.operation_result, "no header");
                assert!(partial.handle.is_none());
                assert!(matches!(source, FetchError::MissingHandle(_)));
            }
            other => panic!("expected PollingFailed, got {other:?}"),
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_cancelled_token_skips_mutation() {
        let token = CancellationToken::new();
        token.cancel();
        let mutated = Arc::new(AtomicU32::new(0));
        let counter = mutated.clone();
        let targets = TargetStates::new(["ACTIVE"]);

        let result = Waiter::new(policy())
            .with_cancellation(token)
            .wait_for_completion(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, Infallible>(()) }
                },
                |_| Some(CompletionKind::Resource.handle("db-1")),
                |_| async { Ok(Snap("ACTIVE")) },
                |s: &Snap| targets.matches(s),
                &targets,
            )
            .await;

        assert!(matches!(result, Err(WaitError::Cancelled { partial: None })));
        assert_eq!(mutated.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_is_bounded_by_total_wait() {
        let targets = TargetStates::new(["SUCCEEDED"]);
        let started = Instant::now();

        let result = Waiter::new(policy())
            .wait_for_completion(
                || async { Ok::<_, Infallible>("accepted") },
                |_| Some(OperationHandle::WorkRequest("wr-1".into())),
                |_| std::future::pending::<Result<Snap, FetchError>>(),
                |s: &Snap| targets.matches(s),
                &targets,
            )
            .await;

        assert!(matches!(result, Err(WaitError::PollingTimedOut { .. })));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(31), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fetch_is_started_once_budget_is_spent() {
        let fetches_started = Arc::new(AtomicU32::new(0));
        let fetches_completed = Arc::new(AtomicU32::new(0));
        let (started_counter, completed_counter) =
            (fetches_started.clone(), fetches_completed.clone());
        let targets = TargetStates::new(["SUCCEEDED"]);
        let policy = PollingPolicy::new(Duration::from_secs(5), Duration::from_secs(3))
            .expect("valid policy");
        let started = Instant::now();

        let result = Waiter::new(policy)
            .wait_for_completion(
                || async { Ok::<_, Infallible>("accepted") },
                |_| Some(OperationHandle::WorkRequest("wr-1".into())),
                move |_| {
                    let call = started_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    let completed = completed_counter.clone();
                    async move {
                        sleep(Duration::from_millis(100)).await;
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(Snap(if call >= 3 { "SUCCEEDED" } else { "IN_PROGRESS" }))
                    }
                },
                |s: &Snap| targets.matches(s),
                &targets,
            )
            .await;

        match result {
            Err(WaitError::PollingTimedOut { partial }) => {
                assert_eq!(partial.attempts, 2);
                assert_eq!(partial.last_snapshot, Some(Snap("IN_PROGRESS")));
            }
            other => panic!("expected PollingTimedOut, got {other:?}"),
        }
        // Every fetch that was started ran to completion
        assert_eq!(fetches_started.load(Ordering::SeqCst), 2);
        assert_eq!(fetches_completed.load(Ordering::SeqCst), 2);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3200), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_mutation_returns_no_partial() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(2)).await;
            canceller.cancel();
        });
        let fetches = Arc::new(AtomicU32::new(0));
        let counter = fetches.clone();
        let targets = TargetStates::new(["ACTIVE"]);
        let started = Instant::now();

        let result = Waiter::new(policy())
            .with_cancellation(token)
            .wait_for_completion(
                || async {
                    sleep(Duration::from_secs(60)).await;
                    Ok::<_, Infallible>(())
                },
                |_| Some(CompletionKind::Resource.handle("db-1")),
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Snap("ACTIVE")) }
                },
                |s: &Snap| targets.matches(s),
                &targets,
            )
            .await;

        assert!(matches!(result, Err(WaitError::Cancelled { partial: None })));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
