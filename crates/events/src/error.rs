use jobsync_core::JobId;
use thiserror::Error;

/// A frame could not be turned into a [`crate::StreamEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event payload is not a JSON object")]
    NotAnObject,
}

/// A decoded event that cannot be routed to a store entry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event {event_type:?} carries no job id")]
    MissingJobId { event_type: String },
    #[error("event {event_type:?} for job {job_id} carries no resource id")]
    MissingResourceId { event_type: String, job_id: JobId },
}
