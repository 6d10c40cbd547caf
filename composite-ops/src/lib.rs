//! This crate provides the building blocks for composite operations against
//! asynchronous cloud APIs:
//! - A wait-for-state loop that turns "mutate, then poll until settled" into one call
//! - Completion tracking through work requests or a resource's own lifecycle state
//! - Typed work request and lifecycle models with lossless enum fallback
//! - A `reqwest`-backed REST client and status fetchers to plug into the waiter
//!

pub mod config;
mod error;
pub mod models;
mod policy;
pub mod rest;
mod types;
pub mod waiter;

// Re-exports for a small, focused public API
pub use error::{BoxError, FetchError, PolicyError, WaitError};
pub use policy::{
    PollingPolicy, DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_INTERVAL, DEFAULT_MAX_TOTAL_WAIT,
};
pub use types::{
    CompletionKind, OperationHandle, PartialResult, StateSnapshot, TargetStates, WaitOutcome,
};
pub use waiter::{CompositeOperation, StatusFetcher, Waiter};
