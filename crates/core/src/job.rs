//! Job identity and lifecycle record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{JobId, ResourceId};

/// Kind of platform operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    EnvironmentSync,
    RemoteBackup,
    RemoteRestore,
    PromotionExecute,
    SnapshotRestore,
    /// A job type this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::EnvironmentSync => "environment_sync",
            JobType::RemoteBackup => "remote_backup",
            JobType::RemoteRestore => "remote_restore",
            JobType::PromotionExecute => "promotion_execute",
            JobType::SnapshotRestore => "snapshot_restore",
            JobType::Unknown => "unknown",
        }
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
///
/// Statuses only move forward: `Pending → Running → {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    /// Currently being executed
    Running,
    /// Completed successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped after a cancellation request was honored
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Pending or running: the job may still make progress and can be cancelled.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Position along the lifecycle; all terminal statuses share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 2,
        }
    }

    /// Whether moving from `self` to `next` is a forward lifecycle step.
    pub fn advances_to(&self, next: JobStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of resource a job is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Environment,
    Promotion,
    None,
}

/// Tagged reference to the resource a job operates on.
///
/// Used for display routing only; merge identity is always the [`JobId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResourceRef {
    Environment(ResourceId),
    Promotion(ResourceId),
    None,
}

impl ResourceRef {
    /// Build a reference from a kind and id. The id is discarded for `ResourceKind::None`.
    pub fn new(kind: ResourceKind, id: ResourceId) -> Self {
        match kind {
            ResourceKind::Environment => ResourceRef::Environment(id),
            ResourceKind::Promotion => ResourceRef::Promotion(id),
            ResourceKind::None => ResourceRef::None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRef::Environment(_) => ResourceKind::Environment,
            ResourceRef::Promotion(_) => ResourceKind::Promotion,
            ResourceRef::None => ResourceKind::None,
        }
    }

    pub fn id(&self) -> Option<&ResourceId> {
        match self {
            ResourceRef::Environment(id) | ResourceRef::Promotion(id) => Some(id),
            ResourceRef::None => None,
        }
    }
}

impl Default for ResourceRef {
    fn default() -> Self {
        ResourceRef::None
    }
}

/// Progress counters reported while a job runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
}

/// Lifecycle timestamps. `completed` is set iff the status is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
}

impl Timestamps {
    pub fn created_at(created: DateTime<Utc>) -> Self {
        Self {
            created,
            started: None,
            completed: None,
        }
    }
}

/// Failure details, present only when the job failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// A background job as seen by the console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(default)]
    pub resource: ResourceRef,
    #[serde(default)]
    pub progress: Progress,
    pub timestamps: Timestamps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Opaque payload, interpreted by consumers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Create a pending job.
    pub fn new(id: JobId, job_type: JobType, resource: ResourceRef, created: DateTime<Utc>) -> Self {
        Self {
            id,
            job_type,
            status: JobStatus::Pending,
            resource,
            progress: Progress::default(),
            timestamps: Timestamps::created_at(created),
            error: None,
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time since the job was created, clamped at zero for clock skew.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = now - self.timestamps.created;
        if elapsed < Duration::zero() {
            Duration::zero()
        } else {
            elapsed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ranks_are_monotonic_along_lifecycle() {
        assert!(JobStatus::Pending.advances_to(JobStatus::Running));
        assert!(JobStatus::Running.advances_to(JobStatus::Cancelled));
        assert!(JobStatus::Pending.advances_to(JobStatus::Failed));
        assert!(!JobStatus::Running.advances_to(JobStatus::Pending));
        assert!(!JobStatus::Running.advances_to(JobStatus::Running));
        assert!(!JobStatus::Completed.advances_to(JobStatus::Failed));
    }

    #[test]
    fn resource_ref_uses_kind_tag() {
        let env = ResourceRef::Environment(ResourceId::new("env-1"));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "environment", "id": "env-1"}));

        let none: ResourceRef = serde_json::from_value(serde_json::json!({"kind": "none"})).unwrap();
        assert_eq!(none, ResourceRef::None);
    }

    #[test]
    fn unknown_job_type_does_not_fail_decoding() {
        let job_type: JobType = serde_json::from_str("\"workflow_analyze\"").unwrap();
        assert_eq!(job_type, JobType::Unknown);
    }

    #[test]
    fn job_decodes_from_wire_shape() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": "job-1",
            "jobType": "remote_backup",
            "status": "running",
            "resource": {"kind": "environment", "id": "env-9"},
            "progress": {"current": 2, "total": 5, "currentStep": "push"},
            "timestamps": {"created": "2024-05-01T10:00:00Z", "started": "2024-05-01T10:00:01Z"}
        }))
        .unwrap();

        assert_eq!(job.job_type, JobType::RemoteBackup);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress.current_step.as_deref(), Some("push"));
        assert!(job.timestamps.completed.is_none());
        assert!(job.error.is_none());
    }
}
