//! Stream event model.
//!
//! A push connection is opened per [`StreamKey`] (resource category). Every
//! message is a JSON object with a `type` discriminator. Three families exist:
//!
//! - **Job updates** (`sync.progress`, `backup.completed`, ...): partial state
//!   for one job. They must name both the job and the resource, otherwise they
//!   cannot be routed and are dropped.
//! - **Snapshots** (`snapshot`): full records of the jobs currently active on
//!   the server, typically sent right after (re)connecting.
//! - **Control** (`heartbeat`, `ping`, `connected`): keep-alives with no state.
//!
//! Events within one connection arrive in emission order. Across reconnects
//! replays are possible, so everything produced here feeds an idempotent merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobsync_core::{
    EventId, Job, JobFailure, JobId, JobPatch, JobStatus, JobType, ResourceId, ResourceKind,
    ResourceRef,
};

use crate::error::EventError;

/// Resource category addressed by one push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKey {
    /// Every background job of the tenant.
    BackgroundJobs,
    /// Promotion/deployment executions.
    Deployments,
}

impl StreamKey {
    /// Path segment of the stream endpoint (`/streams/{path}`).
    pub fn path(&self) -> &'static str {
        match self {
            StreamKey::BackgroundJobs => "jobs",
            StreamKey::Deployments => "deployments",
        }
    }

    /// Resource kind implied by the category when an event does not name one.
    pub fn default_resource_kind(&self) -> Option<ResourceKind> {
        match self {
            StreamKey::BackgroundJobs => None,
            StreamKey::Deployments => Some(ResourceKind::Promotion),
        }
    }
}

impl core::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.path())
    }
}

impl core::str::FromStr for StreamKey {
    type Err = jobsync_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jobs" | "background_jobs" => Ok(StreamKey::BackgroundJobs),
            "deployments" => Ok(StreamKey::Deployments),
            other => Err(jobsync_core::DomainError::validation(format!(
                "unknown stream key: {}",
                other
            ))),
        }
    }
}

/// Family of a stream event, derived from its `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Snapshot,
    Control,
    JobUpdate,
}

/// One decoded push message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub resource_id: Option<ResourceId>,
    #[serde(default)]
    pub resource_kind: Option<ResourceKind>,
    #[serde(default)]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub error: Option<JobFailure>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Full records, only on `snapshot` events.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<Job>,
    /// SSE frame id; the resumption token once this event is processed.
    #[serde(skip)]
    pub event_id: Option<EventId>,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "snapshot" => EventKind::Snapshot,
            "heartbeat" | "ping" | "connected" => EventKind::Control,
            _ => EventKind::JobUpdate,
        }
    }

    /// Status implied by the event name (`*.started`, `*.progress`, `*.completed`, ...)
    /// when the payload has no explicit `status`.
    fn implied_status(&self) -> Option<JobStatus> {
        let suffix = self.event_type.rsplit('.').next()?;
        match suffix {
            "started" | "progress" | "running" => Some(JobStatus::Running),
            "completed" | "succeeded" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" | "canceled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Resource kind implied by the job type, or else by the event family
    /// (`sync.*`, `backup.*`, `promotion.*`, ...).
    fn implied_resource_kind(&self) -> Option<ResourceKind> {
        match self.job_type {
            Some(JobType::PromotionExecute) => return Some(ResourceKind::Promotion),
            Some(JobType::Unknown) | None => {}
            Some(_) => return Some(ResourceKind::Environment),
        }
        let family = self.event_type.split('.').next()?;
        match family {
            "sync" | "backup" | "restore" | "snapshot_restore" | "environment" => {
                Some(ResourceKind::Environment)
            }
            "promotion" | "deployment" => Some(ResourceKind::Promotion),
            _ => None,
        }
    }

    /// Route the event into store patches.
    ///
    /// Control events yield nothing; snapshots yield one full patch per job.
    pub fn into_patches(
        self,
        key: StreamKey,
        observed_at: DateTime<Utc>,
    ) -> Result<Vec<JobPatch>, EventError> {
        match self.kind() {
            EventKind::Control => Ok(Vec::new()),
            EventKind::Snapshot => Ok(self
                .jobs
                .iter()
                .map(|job| JobPatch::from_job(job, observed_at))
                .collect()),
            EventKind::JobUpdate => self.into_job_patch(key, observed_at).map(|p| vec![p]),
        }
    }

    fn into_job_patch(
        self,
        key: StreamKey,
        observed_at: DateTime<Utc>,
    ) -> Result<JobPatch, EventError> {
        let status = self.status.or_else(|| self.implied_status());
        let kind = self
            .resource_kind
            .or_else(|| key.default_resource_kind())
            .or_else(|| self.implied_resource_kind());

        let Some(job_id) = self.job_id else {
            return Err(EventError::MissingJobId {
                event_type: self.event_type,
            });
        };
        let Some(resource_id) = self.resource_id else {
            return Err(EventError::MissingResourceId {
                event_type: self.event_type,
                job_id,
            });
        };

        let mut patch = JobPatch::new(job_id, observed_at);
        patch.status = status;
        patch.job_type = self.job_type;
        match kind {
            Some(kind) => patch.resource = Some(ResourceRef::new(kind, resource_id)),
            None => patch.resource_id = Some(resource_id),
        }
        patch.progress.current = self.current;
        patch.progress.total = self.total;
        patch.progress.percentage = self.percentage;
        patch.progress.message = self.message;
        patch.progress.current_step = self.current_step;
        patch.error = self.error;
        patch.result = self.result;
        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_event() -> StreamEvent {
        StreamEvent {
            event_type: "sync.progress".to_string(),
            job_id: Some(JobId::new("job-1")),
            resource_id: Some(ResourceId::new("env-1")),
            resource_kind: Some(ResourceKind::Environment),
            current: Some(3),
            total: Some(10),
            message: Some("copying tables".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn progress_event_becomes_partial_running_patch() {
        let patches = progress_event()
            .into_patches(StreamKey::BackgroundJobs, Utc::now())
            .unwrap();

        assert_eq!(patches.len(), 1);
        let patch = &patches[0];
        assert_eq!(patch.status, Some(JobStatus::Running));
        assert_eq!(patch.progress.current, Some(3));
        assert_eq!(patch.progress.total, Some(10));
        assert_eq!(
            patch.resource,
            Some(ResourceRef::Environment(ResourceId::new("env-1")))
        );
        assert!(patch.job_type.is_none());
        assert!(patch.created.is_none());
    }

    #[test]
    fn explicit_status_wins_over_event_name() {
        let mut event = progress_event();
        event.status = Some(JobStatus::Cancelled);
        let patches = event.into_patches(StreamKey::BackgroundJobs, Utc::now()).unwrap();
        assert_eq!(patches[0].status, Some(JobStatus::Cancelled));
    }

    #[test]
    fn event_without_job_id_is_unroutable() {
        let mut event = progress_event();
        event.job_id = None;
        assert!(matches!(
            event.into_patches(StreamKey::BackgroundJobs, Utc::now()),
            Err(EventError::MissingJobId { .. })
        ));
    }

    #[test]
    fn event_without_resource_id_is_unroutable() {
        let mut event = progress_event();
        event.resource_id = None;
        assert!(matches!(
            event.into_patches(StreamKey::BackgroundJobs, Utc::now()),
            Err(EventError::MissingResourceId { .. })
        ));
    }

    #[test]
    fn deployments_stream_defaults_to_promotion_resources() {
        let mut event = progress_event();
        event.event_type = "deployment.started".to_string();
        event.resource_kind = None;
        let patches = event.into_patches(StreamKey::Deployments, Utc::now()).unwrap();
        assert_eq!(
            patches[0].resource,
            Some(ResourceRef::Promotion(ResourceId::new("env-1")))
        );
    }

    #[test]
    fn event_family_implies_resource_kind() {
        let mut event = progress_event();
        event.resource_kind = None;
        let patches = event.into_patches(StreamKey::BackgroundJobs, Utc::now()).unwrap();
        assert_eq!(
            patches[0].resource,
            Some(ResourceRef::Environment(ResourceId::new("env-1")))
        );

        let mut event = progress_event();
        event.event_type = "workflow.progress".to_string();
        event.resource_kind = None;
        event.job_type = Some(JobType::PromotionExecute);
        let patches = event.into_patches(StreamKey::BackgroundJobs, Utc::now()).unwrap();
        assert_eq!(
            patches[0].resource,
            Some(ResourceRef::Promotion(ResourceId::new("env-1")))
        );
    }

    #[test]
    fn unclassified_resource_id_is_kept_without_a_kind() {
        let mut event = progress_event();
        event.event_type = "workflow.progress".to_string();
        event.resource_kind = None;
        let patches = event.into_patches(StreamKey::BackgroundJobs, Utc::now()).unwrap();

        assert!(patches[0].resource.is_none());
        assert_eq!(patches[0].resource_id, Some(ResourceId::new("env-1")));
        assert_eq!(patches[0].resource_id(), Some(&ResourceId::new("env-1")));
    }

    #[test]
    fn heartbeat_yields_nothing() {
        let event = StreamEvent {
            event_type: "heartbeat".to_string(),
            ..Default::default()
        };
        assert!(event
            .into_patches(StreamKey::BackgroundJobs, Utc::now())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn snapshot_yields_full_patches() {
        let now = Utc::now();
        let job = Job::new(
            JobId::new("job-7"),
            JobType::RemoteRestore,
            ResourceRef::Environment(ResourceId::new("env-2")),
            now,
        );
        let event = StreamEvent {
            event_type: "snapshot".to_string(),
            jobs: vec![job.clone()],
            ..Default::default()
        };
        let patches = event.into_patches(StreamKey::BackgroundJobs, now).unwrap();
        assert_eq!(patches, vec![JobPatch::from_job(&job, now)]);
    }
}
