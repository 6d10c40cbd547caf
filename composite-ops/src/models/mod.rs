//! Wire models for the status endpoints polled by composite operations.
//!
//! Enum-valued fields are closed sum types with one `Unrecognized` variant.
//! Unknown wire values go through a single conversion point per enum and are
//! preserved verbatim, so a newer service never breaks deserialization.

mod lifecycle;
mod work_request;

pub use lifecycle::{LifecycleState, ResourceSnapshot};
pub use work_request::{WorkRequest, WorkRequestResource, WorkRequestStatus};
