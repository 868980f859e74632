use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;

use jobsync_core::{JobId, JobPatch, Origin};
use jobsync_store::JobStateStore;

use crate::api::JobsApi;
use crate::poll::PollDecision;

const BASE_MS: u128 = 2_000;
const STEP_MS: u128 = 2_000;
const STEP_EVERY_MS: u128 = 30_000;
const MAX_MS: u128 = 10_000;

/// Delay before the next single-job poll: starts at 2 s, grows by 2 s for every
/// 30 s of job age, capped at 10 s.
pub fn single_poll_interval(elapsed: Duration) -> Duration {
    let steps = elapsed.as_millis() / STEP_EVERY_MS;
    let ms = BASE_MS.saturating_add(steps.saturating_mul(STEP_MS)).min(MAX_MS);
    Duration::from_millis(ms as u64)
}

/// Polls one job until it is observed terminal.
pub struct SinglePoller {
    api: Arc<dyn JobsApi>,
    store: Arc<JobStateStore>,
    job_id: JobId,
}

impl SinglePoller {
    pub fn new(api: Arc<dyn JobsApi>, store: Arc<JobStateStore>, job_id: JobId) -> Self {
        Self { api, store, job_id }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub async fn poll_once(&self) -> PollDecision {
        if self.stored_terminal() {
            return PollDecision::Stop;
        }

        let sequence = self.store.next_sequence();
        match self.api.get_job(&self.job_id).await {
            Ok(job) => {
                let outcome = self.store.apply(
                    &JobPatch::from_job(&job, Utc::now()),
                    Origin::SinglePoll,
                    sequence,
                );
                tracing::debug!(job_id = %self.job_id, status = %job.status, outcome = ?outcome, "single poll merged");
            }
            Err(err) => {
                tracing::warn!(job_id = %self.job_id, error = %err, "single poll failed");
            }
        }

        match self.store.get(&self.job_id) {
            Some(job) if job.is_terminal() => PollDecision::Stop,
            Some(job) => {
                let elapsed = job.elapsed(Utc::now()).to_std().unwrap_or_default();
                PollDecision::Reschedule(single_poll_interval(elapsed))
            }
            None => PollDecision::Reschedule(single_poll_interval(Duration::ZERO)),
        }
    }

    pub async fn run(self, shutdown: Arc<Notify>) {
        loop {
            let decision = tokio::select! {
                _ = shutdown.notified() => return,
                decision = self.poll_once() => decision,
            };

            match decision {
                PollDecision::Stop => {
                    tracing::debug!(job_id = %self.job_id, "job terminal; single poll stopped");
                    return;
                }
                PollDecision::Reschedule(delay) => {
                    tokio::select! {
                        _ = shutdown.notified() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn stored_terminal(&self) -> bool {
        self.store
            .get(&self.job_id)
            .is_some_and(|job| job.is_terminal())
    }
}
