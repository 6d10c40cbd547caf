//! Resources that report completion through their own lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::StateSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleState {
    Creating,
    Updating,
    Active,
    Inactive,
    NeedsAttention,
    InProgress,
    Succeeded,
    Canceling,
    Canceled,
    Deleting,
    Deleted,
    Failed,
    Unrecognized(String),
}

impl LifecycleState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "CREATING",
            Self::Updating => "UPDATING",
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::NeedsAttention => "NEEDS_ATTENTION",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Canceling => "CANCELING",
            Self::Canceled => "CANCELED",
            Self::Deleting => "DELETING",
            Self::Deleted => "DELETED",
            Self::Failed => "FAILED",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<&str> for LifecycleState {
    fn from(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "CREATING" => Self::Creating,
            "UPDATING" => Self::Updating,
            "ACTIVE" => Self::Active,
            "INACTIVE" => Self::Inactive,
            "NEEDS_ATTENTION" => Self::NeedsAttention,
            "IN_PROGRESS" => Self::InProgress,
            "SUCCEEDED" => Self::Succeeded,
            "CANCELING" => Self::Canceling,
            "CANCELED" => Self::Canceled,
            "DELETING" => Self::Deleting,
            "DELETED" => Self::Deleted,
            "FAILED" => Self::Failed,
            _ => {
                log::debug!("Unknown lifecycle state '{value}'");
                Self::Unrecognized(value.to_string())
            }
        }
    }
}

impl From<String> for LifecycleState {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<LifecycleState> for String {
    fn from(value: LifecycleState) -> Self {
        match value {
            LifecycleState::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of a resource the waiter needs, plus everything else it sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_state: Option<LifecycleState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_details: Option<String>,
    /// Remaining fields of the resource body.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StateSnapshot for ResourceSnapshot {
    fn state(&self) -> Option<&str> {
        self.lifecycle_state.as_ref().map(LifecycleState::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_keeps_extra_fields() {
        let snapshot: ResourceSnapshot = serde_json::from_value(json!({
            "id": "backup-1",
            "displayName": "nightly",
            "lifecycleState": "UPDATING",
            "sizeInGBs": 12,
            "bucketName": "backups"
        }))
        .expect("resource should deserialize");

        assert_eq!(snapshot.lifecycle_state, Some(LifecycleState::Updating));
        assert_eq!(snapshot.state(), Some("UPDATING"));
        assert_eq!(snapshot.extra["sizeInGBs"], 12);
        assert_eq!(snapshot.extra["bucketName"], "backups");
        assert!(!snapshot.extra.contains_key("lifecycleState"));
    }

    #[test]
    fn test_missing_lifecycle_state() {
        let snapshot: ResourceSnapshot =
            serde_json::from_value(json!({"id": "db-1"})).expect("resource should deserialize");
        assert_eq!(snapshot.state(), None);
    }

    #[test]
    fn test_unrecognized_state_round_trips() {
        let state = LifecycleState::from("MIGRATING");
        assert_eq!(state, LifecycleState::Unrecognized("MIGRATING".into()));
        assert_eq!(state.to_string(), "MIGRATING");
        assert_eq!(LifecycleState::from("active"), LifecycleState::Active);
    }
}
