//! Work request records returned by `GET .../workRequests/{id}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::StateSnapshot;

/// Progress of a tracked asynchronous job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkRequestStatus {
    Accepted,
    InProgress,
    Waiting,
    NeedsAttention,
    Failed,
    Succeeded,
    Canceling,
    Canceled,
    /// A value this client does not know about, kept as sent.
    Unrecognized(String),
}

impl WorkRequestStatus {
    /// States a job can no longer leave.
    pub const TERMINAL: [Self; 3] = [Self::Succeeded, Self::Failed, Self::Canceled];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Waiting => "WAITING",
            Self::NeedsAttention => "NEEDS_ATTENTION",
            Self::Failed => "FAILED",
            Self::Succeeded => "SUCCEEDED",
            Self::Canceling => "CANCELING",
            Self::Canceled => "CANCELED",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<&str> for WorkRequestStatus {
    fn from(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "ACCEPTED" => Self::Accepted,
            "IN_PROGRESS" => Self::InProgress,
            "WAITING" => Self::Waiting,
            "NEEDS_ATTENTION" => Self::NeedsAttention,
            "FAILED" => Self::Failed,
            "SUCCEEDED" => Self::Succeeded,
            "CANCELING" => Self::Canceling,
            "CANCELED" => Self::Canceled,
            _ => {
                log::debug!("Unknown work request status '{value}'");
                Self::Unrecognized(value.to_string())
            }
        }
    }
}

impl From<String> for WorkRequestStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<WorkRequestStatus> for String {
    fn from(value: WorkRequestStatus) -> Self {
        match value {
            WorkRequestStatus::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for WorkRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource affected by a work request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequestResource {
    pub entity_type: String,
    pub action_type: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_uri: Option<String>,
}

/// Provider-side record of an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequest {
    pub id: String,
    pub status: WorkRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compartment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<WorkRequestResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_accepted: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_finished: Option<DateTime<Utc>>,
}

impl StateSnapshot for WorkRequest {
    fn state(&self) -> Option<&str> {
        Some(self.status.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_work_request() {
        let wr: WorkRequest = serde_json::from_value(json!({
            "id": "ocid1.workrequest.oc1..aaaa",
            "operationType": "START_DEPLOYMENT",
            "status": "IN_PROGRESS",
            "compartmentId": "ocid1.compartment.oc1..bbbb",
            "percentComplete": 42.5,
            "resources": [{
                "entityType": "deployment",
                "actionType": "IN_PROGRESS",
                "identifier": "ocid1.deployment.oc1..cccc"
            }],
            "timeAccepted": "2024-03-01T10:15:00.000Z"
        }))
        .expect("work request should deserialize");

        assert_eq!(wr.status, WorkRequestStatus::InProgress);
        assert_eq!(wr.operation_type.as_deref(), Some("START_DEPLOYMENT"));
        assert_eq!(wr.resources.len(), 1);
        assert_eq!(wr.resources[0].entity_uri, None);
        assert_eq!(wr.percent_complete, Some(42.5));
        assert!(wr.time_accepted.is_some());
        assert!(wr.time_finished.is_none());
        assert_eq!(wr.state(), Some("IN_PROGRESS"));
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let wr: WorkRequest = serde_json::from_value(json!({
            "id": "wr-1",
            "status": "PAUSED_FOR_MAINTENANCE"
        }))
        .expect("unknown status should still deserialize");

        assert_eq!(
            wr.status,
            WorkRequestStatus::Unrecognized("PAUSED_FOR_MAINTENANCE".into())
        );
        assert!(!WorkRequestStatus::TERMINAL.contains(&wr.status));

        let back = serde_json::to_value(&wr).expect("work request should serialize");
        assert_eq!(back["status"], "PAUSED_FOR_MAINTENANCE");
        assert!(back.get("resources").is_none());
    }

    #[test]
    fn test_status_conversion_is_case_insensitive() {
        assert_eq!(WorkRequestStatus::from("succeeded"), WorkRequestStatus::Succeeded);
        assert_eq!(String::from(WorkRequestStatus::Canceled), "CANCELED");
        assert!(WorkRequestStatus::TERMINAL.contains(&WorkRequestStatus::Failed));
        assert!(!WorkRequestStatus::TERMINAL.contains(&WorkRequestStatus::Canceling));
    }
}
