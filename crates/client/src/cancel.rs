//! Cooperative cancellation.
//!
//! A request only asks the worker to stop. The store is never touched here:
//! the `cancelled` status arrives later through the stream or a poll, like any
//! other transition.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use jobsync_core::{JobId, JobStatus};
use jobsync_store::JobStateStore;

use crate::api::JobsApi;
use crate::error::CancelError;

/// The API accepted a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequested {
    pub job_id: JobId,
    /// Stored status when the request was sent.
    pub status: JobStatus,
    pub requested_at: DateTime<Utc>,
}

pub struct CancellationCoordinator {
    api: Arc<dyn JobsApi>,
    store: Arc<JobStateStore>,
    in_flight: Mutex<HashSet<JobId>>,
}

impl CancellationCoordinator {
    pub fn new(api: Arc<dyn JobsApi>, store: Arc<JobStateStore>) -> Self {
        Self {
            api,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a cancel button should be offered for `id`.
    pub fn is_cancellable(&self, id: &JobId) -> bool {
        self.store.get(id).is_some_and(|job| job.status.is_active()) && !self.is_in_flight(id)
    }

    pub fn is_in_flight(&self, id: &JobId) -> bool {
        self.lock().contains(id)
    }

    pub async fn request_cancel(
        &self,
        id: &JobId,
        reason: Option<&str>,
    ) -> Result<CancelRequested, CancelError> {
        let status = self
            .store
            .get(id)
            .map(|job| job.status)
            .ok_or_else(|| CancelError::UnknownJob(id.clone()))?;
        if !status.is_active() {
            return Err(CancelError::NotCancellable {
                job_id: id.clone(),
                status,
            });
        }

        let _in_flight = InFlight::acquire(self, id)?;
        tracing::info!(job_id = %id, status = %status, reason = ?reason, "requesting cancellation");

        match self.api.cancel_job(id, reason).await {
            Ok(()) => Ok(CancelRequested {
                job_id: id.clone(),
                status,
                requested_at: Utc::now(),
            }),
            Err(err) => {
                tracing::warn!(job_id = %id, error = %err, "cancellation request failed");
                Err(err.into())
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a job as having a request in flight until dropped.
struct InFlight<'a> {
    owner: &'a CancellationCoordinator,
    id: JobId,
}

impl<'a> InFlight<'a> {
    fn acquire(owner: &'a CancellationCoordinator, id: &JobId) -> Result<Self, CancelError> {
        if !owner.lock().insert(id.clone()) {
            return Err(CancelError::AlreadyRequested(id.clone()));
        }
        Ok(Self {
            owner,
            id: id.clone(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.owner.lock().remove(&self.id);
    }
}
