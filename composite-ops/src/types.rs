//! Core data types for composite operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// How an asynchronous operation reports completion.
///
/// This is a static property of the endpoint: an operation either hands back
/// a work request to track, or the mutated resource carries its own
/// lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionKind {
    WorkRequest,
    Resource,
}

impl CompletionKind {
    /// Logical name of the field holding the state.
    pub fn state_field(self) -> &'static str {
        match self {
            Self::WorkRequest => "status",
            Self::Resource => "lifecycle_state",
        }
    }

    pub fn handle(self, id: impl Into<String>) -> OperationHandle {
        match self {
            Self::WorkRequest => OperationHandle::WorkRequest(id.into()),
            Self::Resource => OperationHandle::Resource(id.into()),
        }
    }
}

/// Identifier produced by a mutating call and consumed by exactly one wait.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum OperationHandle {
    /// A separately tracked asynchronous job (`opc-work-request-id`).
    WorkRequest(String),
    /// The mutated resource itself.
    Resource(String),
}

impl OperationHandle {
    pub fn id(&self) -> &str {
        match self {
            Self::WorkRequest(id) | Self::Resource(id) => id,
        }
    }

    pub fn kind(&self) -> CompletionKind {
        match self {
            Self::WorkRequest(_) => CompletionKind::WorkRequest,
            Self::Resource(_) => CompletionKind::Resource,
        }
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkRequest(id) => write!(f, "work request {id}"),
            Self::Resource(id) => write!(f, "resource {id}"),
        }
    }
}

/// Anything exposing a single string-valued state field.
pub trait StateSnapshot {
    /// Current state as sent on the wire, if the field is present.
    fn state(&self) -> Option<&str>;
}

impl<T: StateSnapshot + ?Sized> StateSnapshot for &T {
    fn state(&self) -> Option<&str> {
        (**self).state()
    }
}

/// Case-insensitive set of state names to wait for.
///
/// An empty set means "do not wait".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetStates(BTreeSet<String>);

impl TargetStates {
    pub fn new<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            states
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, state: &str) -> bool {
        self.0.contains(&state.to_lowercase())
    }

    /// Whether the snapshot's state is one of the targets.
    pub fn matches<T: StateSnapshot + ?Sized>(&self, snapshot: &T) -> bool {
        snapshot.state().is_some_and(|state| self.contains(state))
    }

    /// Lower-cased target names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for TargetStates {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for TargetStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Successful end of a composite operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<R, S> {
    /// The target set was empty; the mutating call's result, unchanged.
    NotWaited(R),
    /// A fetched snapshot reached one of the target states.
    Completed {
        operation_result: R,
        snapshot: S,
        attempts: u32,
    },
    /// The tracked object disappeared and the waiter was told to accept that.
    Gone { operation_result: R, attempts: u32 },
}

impl<R, S> WaitOutcome<R, S> {
    pub fn operation_result(&self) -> &R {
        match self {
            Self::NotWaited(result)
            | Self::Completed {
                operation_result: result,
                ..
            }
            | Self::Gone {
                operation_result: result,
                ..
            } => result,
        }
    }

    pub fn snapshot(&self) -> Option<&S> {
        match self {
            Self::Completed { snapshot, .. } => Some(snapshot),
            Self::NotWaited(_) | Self::Gone { .. } => None,
        }
    }

    pub fn into_snapshot(self) -> Option<S> {
        match self {
            Self::Completed { snapshot, .. } => Some(snapshot),
            Self::NotWaited(_) | Self::Gone { .. } => None,
        }
    }

    /// Number of status fetches performed.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::NotWaited(_) => 0,
            Self::Completed { attempts, .. } | Self::Gone { attempts, .. } => *attempts,
        }
    }
}

/// What a failed wait had already obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult<R, S> {
    /// Response of the mutating call.
    pub operation_result: R,
    /// `None` when no handle could be extracted from the response.
    pub handle: Option<OperationHandle>,
    pub last_snapshot: Option<S>,
    pub attempts: u32,
    /// Time spent polling.
    pub elapsed: Duration,
}

impl<R, S> fmt::Display for PartialResult<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.handle {
            Some(handle) => write!(f, "{handle}")?,
            None => write!(f, "operation without handle")?,
        }
        write!(
            f,
            " after {} attempts in {}s",
            self.attempts,
            self.elapsed.as_secs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<&'static str>);

    impl StateSnapshot for Fixed {
        fn state(&self) -> Option<&str> {
            self.0
        }
    }

    #[test]
    fn test_target_states_lowercase_and_dedupe() {
        let targets = TargetStates::new(["SUCCEEDED", "succeeded", " Failed ", ""]);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets.iter().collect::<Vec<_>>(), vec!["failed", "succeeded"]);
        assert_eq!(targets.to_string(), "{failed, succeeded}");
    }

    #[test]
    fn test_matches_ignores_missing_state() {
        let targets: TargetStates = ["ACTIVE"].into_iter().collect();
        assert!(targets.matches(&Fixed(Some("active"))));
        assert!(!targets.matches(&Fixed(Some("UPDATING"))));
        assert!(!targets.matches(&Fixed(None)));
    }

    #[test]
    fn test_handle_kind_round_trip() {
        let handle = CompletionKind::Resource.handle("backup-1");
        assert_eq!(handle, OperationHandle::Resource("backup-1".into()));
        assert_eq!(handle.kind(), CompletionKind::Resource);
        assert_eq!(handle.id(), "backup-1");
        assert_eq!(handle.to_string(), "resource backup-1");
        assert_eq!(handle.kind().state_field(), "lifecycle_state");
        assert_eq!(CompletionKind::WorkRequest.state_field(), "status");
    }

    #[test]
    fn test_handle_json_shape() {
        let json = serde_json::to_value(OperationHandle::WorkRequest("wr-1".into()))
            .expect("handle should serialize");
        assert_eq!(json, serde_json::json!({"kind": "work-request", "id": "wr-1"}));
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome: WaitOutcome<&str, &str> = WaitOutcome::Completed {
            operation_result: "accepted",
            snapshot: "SUCCEEDED",
            attempts: 2,
        };
        assert_eq!(outcome.operation_result(), &"accepted");
        assert_eq!(outcome.snapshot(), Some(&"SUCCEEDED"));
        assert_eq!(outcome.attempts(), 2);

        let skipped: WaitOutcome<&str, &str> = WaitOutcome::NotWaited("accepted");
        assert_eq!(skipped.attempts(), 0);
        assert!(skipped.into_snapshot().is_none());
    }
}
