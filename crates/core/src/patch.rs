//! Partial job records produced by the stream and poll sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{JobId, ResourceId};
use crate::job::{Job, JobFailure, JobStatus, JobType, Progress, ResourceRef};

/// Which source produced a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Stream,
    BulkPoll,
    SinglePoll,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Stream => "stream",
            Origin::BulkPoll => "bulk_poll",
            Origin::SinglePoll => "single_poll",
        }
    }
}

impl core::fmt::Display for Origin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partial job: only the fields its origin actually reported are `Some`.
///
/// Absent fields leave the stored value untouched when merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    pub id: JobId,
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
    pub resource: Option<ResourceRef>,
    /// Resource id reported without a kind. Adopted under the stored kind.
    pub resource_id: Option<ResourceId>,
    pub progress: Progress,
    pub created: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub error: Option<JobFailure>,
    pub result: Option<serde_json::Value>,
    /// When the origin observed this state. Used as the creation time of jobs
    /// first seen through a partial patch.
    pub observed_at: DateTime<Utc>,
}

impl JobPatch {
    /// An empty patch for `id`.
    pub fn new(id: JobId, observed_at: DateTime<Utc>) -> Self {
        Self {
            id,
            job_type: None,
            status: None,
            resource: None,
            resource_id: None,
            progress: Progress::default(),
            created: None,
            started: None,
            completed: None,
            error: None,
            result: None,
            observed_at,
        }
    }

    /// A patch carrying every field of a full record (poll responses, snapshots).
    pub fn from_job(job: &Job, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: job.id.clone(),
            job_type: Some(job.job_type),
            status: Some(job.status),
            resource: Some(job.resource.clone()),
            resource_id: None,
            progress: job.progress.clone(),
            created: Some(job.timestamps.created),
            started: job.timestamps.started,
            completed: job.timestamps.completed,
            error: job.error.clone(),
            result: job.result.clone(),
            observed_at,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_resource(mut self, resource: ResourceRef) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Resource the patch names, whether or not its kind is known.
    pub fn resource_id(&self) -> Option<&ResourceId> {
        self.resource
            .as_ref()
            .and_then(ResourceRef::id)
            .or(self.resource_id.as_ref())
    }

    pub fn with_counters(mut self, current: u64, total: u64) -> Self {
        self.progress.current = Some(current);
        self.progress.total = Some(total);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.progress.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: JobFailure) -> Self {
        self.error = Some(error);
        self
    }

    /// True when the patch reports nothing beyond its identity.
    pub fn is_empty(&self) -> bool {
        self.job_type.is_none()
            && self.status.is_none()
            && self.resource.is_none()
            && self.resource_id.is_none()
            && self.progress == Progress::default()
            && self.created.is_none()
            && self.started.is_none()
            && self.completed.is_none()
            && self.error.is_none()
            && self.result.is_none()
    }
}
