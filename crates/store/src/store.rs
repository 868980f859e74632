use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use jobsync_core::{Job, JobId, JobPage, JobPatch, JobQuery, Origin};

use crate::merge::{MergeOutcome, merge_job};
use crate::sequence::{Sequence, SequenceClock};
use crate::snapshot::{JobSnapshot, PageState};

/// How long a finished job stays in the active working set.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10);

/// Shared job state fed by every sync source.
///
/// Writers are serialized; each write builds a fresh [`JobSnapshot`] and swaps
/// it in whole. Subscribers are woken only when a job visibly changed.
pub struct JobStateStore {
    clock: SequenceClock,
    writer: Mutex<()>,
    tx: watch::Sender<Arc<JobSnapshot>>,
    retention: Duration,
}

impl JobStateStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        let (tx, _) = watch::channel(Arc::new(JobSnapshot::default()));
        Self {
            clock: SequenceClock::new(),
            writer: Mutex::new(()),
            tx,
            retention,
        }
    }

    /// Draw a sequence for an event received now or a request issued now.
    pub fn next_sequence(&self) -> Sequence {
        self.clock.tick()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn snapshot(&self) -> Arc<JobSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<JobSnapshot>> {
        self.tx.subscribe()
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.tx.borrow().get(id).cloned()
    }

    pub fn active_jobs(&self, now: DateTime<Utc>) -> Vec<Job> {
        self.tx
            .borrow()
            .active_jobs(now, self.retention)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn apply(&self, patch: &JobPatch, origin: Origin, sequence: Sequence) -> MergeOutcome {
        self.update(|snapshot| {
            let outcome = merge_into(snapshot, patch, origin, sequence);
            (outcome.changed(), outcome)
        })
    }

    /// Merge a batch under one swap; subscribers see all of it or none of it.
    pub fn apply_all(
        &self,
        patches: &[JobPatch],
        origin: Origin,
        sequence: Sequence,
    ) -> Vec<MergeOutcome> {
        self.update(|snapshot| {
            let outcomes: Vec<MergeOutcome> = patches
                .iter()
                .map(|patch| merge_into(snapshot, patch, origin, sequence))
                .collect();
            (outcomes.iter().any(MergeOutcome::changed), outcomes)
        })
    }

    /// Merge a bulk page response and adopt its membership.
    ///
    /// Membership is replaced only by a response at least as new as the one
    /// currently displayed; the records themselves always go through the merge.
    pub fn apply_page(
        &self,
        query: &JobQuery,
        page: &JobPage,
        sequence: Sequence,
        observed_at: DateTime<Utc>,
    ) -> Vec<MergeOutcome> {
        self.update(|snapshot| {
            let outcomes: Vec<MergeOutcome> = page
                .items
                .iter()
                .map(|job| {
                    let patch = JobPatch::from_job(job, observed_at);
                    merge_into(snapshot, &patch, Origin::BulkPoll, sequence)
                })
                .collect();
            let mut changed = outcomes.iter().any(MergeOutcome::changed);

            if sequence >= snapshot.page.sequence {
                let next = PageState {
                    ids: page.items.iter().map(|job| job.id.clone()).collect(),
                    total: page.total,
                    total_pages: page.total_pages,
                    page: query.page,
                    page_size: query.page_size,
                    sequence,
                };
                let membership_changed = PageState {
                    sequence: snapshot.page.sequence,
                    ..next.clone()
                } != snapshot.page;
                changed |= membership_changed;
                snapshot.page = next;
            } else {
                tracing::debug!(
                    sequence,
                    displayed = snapshot.page.sequence,
                    "ignoring membership of stale page response"
                );
            }
            (changed, outcomes)
        })
    }

    /// Keep `id` visible at the top of the list view until unpinned.
    pub fn pin(&self, id: &JobId) -> bool {
        self.update(|snapshot| {
            if snapshot.pinned.contains(id) {
                return (false, false);
            }
            snapshot.pinned.insert(0, id.clone());
            (true, true)
        })
    }

    pub fn unpin(&self, id: &JobId) -> bool {
        self.update(|snapshot| {
            let before = snapshot.pinned.len();
            snapshot.pinned.retain(|pinned| pinned != id);
            let removed = snapshot.pinned.len() != before;
            (removed, removed)
        })
    }

    fn update<R>(&self, f: impl FnOnce(&mut JobSnapshot) -> (bool, R)) -> R {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = JobSnapshot::clone(&self.tx.borrow());
        let (changed, output) = f(&mut next);
        if changed {
            next.version += 1;
        }
        // Field stamps may move without a visible change; the snapshot is
        // replaced either way but subscribers only hear about real changes.
        self.tx.send_if_modified(|slot| {
            *slot = Arc::new(next);
            changed
        });
        output
    }
}

impl Default for JobStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_into(
    snapshot: &mut JobSnapshot,
    patch: &JobPatch,
    origin: Origin,
    sequence: Sequence,
) -> MergeOutcome {
    let (next, outcome) = merge_job(snapshot.jobs.get(&patch.id), patch, origin, sequence);
    match &outcome {
        MergeOutcome::Rejected(reason) => tracing::debug!(
            job_id = %patch.id,
            origin = %origin,
            sequence,
            reason = ?reason,
            "patch rejected"
        ),
        outcome => tracing::trace!(
            job_id = %patch.id,
            origin = %origin,
            sequence,
            outcome = ?outcome,
            "patch merged"
        ),
    }
    if let Some(next) = next {
        snapshot.jobs.insert(patch.id.clone(), next);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsync_core::{JobStatus, JobType, ResourceId, ResourceRef};

    fn job(id: &str, status: JobStatus) -> Job {
        let mut job = Job::new(
            JobId::new(id),
            JobType::EnvironmentSync,
            ResourceRef::Environment(ResourceId::new("env-1")),
            Utc::now(),
        );
        job.status = status;
        if status.is_terminal() {
            job.timestamps.completed = Some(Utc::now());
        }
        job
    }

    fn page(jobs: Vec<Job>) -> JobPage {
        JobPage {
            total: jobs.len() as u64,
            total_pages: 1,
            items: jobs,
        }
    }

    #[test]
    fn subscribers_see_changes_and_version_advances() {
        let store = JobStateStore::new();
        let mut rx = store.subscribe();

        let seq = store.next_sequence();
        let patch = JobPatch::new(JobId::new("job-1"), Utc::now()).with_status(JobStatus::Running);
        assert_eq!(store.apply(&patch, Origin::Stream, seq), MergeOutcome::Created);

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.get(&JobId::new("job-1")).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn unchanged_merge_does_not_notify() {
        let store = JobStateStore::new();
        let patch = JobPatch::new(JobId::new("job-1"), Utc::now()).with_counters(1, 2);
        store.apply(&patch, Origin::Stream, store.next_sequence());

        let mut rx = store.subscribe();
        rx.borrow_and_update();
        let outcome = store.apply(&patch, Origin::Stream, store.next_sequence());

        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.snapshot().version(), 1);
    }

    #[test]
    fn page_from_stale_request_keeps_newer_membership() {
        let store = JobStateStore::new();
        let query = JobQuery::default();
        let stale_seq = store.next_sequence();
        let fresh_seq = store.next_sequence();

        store.apply_page(&query, &page(vec![job("new", JobStatus::Running)]), fresh_seq, Utc::now());
        store.apply_page(&query, &page(vec![job("old", JobStatus::Running)]), stale_seq, Utc::now());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.page().ids, vec![JobId::new("new")]);
        // Records from the stale response still merge.
        assert!(snapshot.get(&JobId::new("old")).is_some());
    }

    #[test]
    fn stale_page_cannot_resurrect_cancelled_job() {
        let store = JobStateStore::new();
        let query = JobQuery::default();
        let request_seq = store.next_sequence();

        let cancelled = JobPatch::from_job(&job("job-1", JobStatus::Cancelled), Utc::now());
        store.apply(&cancelled, Origin::Stream, store.next_sequence());

        let outcomes = store.apply_page(
            &query,
            &page(vec![job("job-1", JobStatus::Running)]),
            request_seq,
            Utc::now(),
        );
        assert!(matches!(outcomes[0], MergeOutcome::Rejected(_)));
        assert_eq!(
            store.get(&JobId::new("job-1")).unwrap().status,
            JobStatus::Cancelled
        );
    }

    #[test]
    fn pin_prepends_and_is_idempotent() {
        let store = JobStateStore::new();
        assert!(store.pin(&JobId::new("a")));
        assert!(store.pin(&JobId::new("b")));
        assert!(!store.pin(&JobId::new("a")));
        assert_eq!(store.snapshot().pinned(), &[JobId::new("b"), JobId::new("a")]);

        assert!(store.unpin(&JobId::new("a")));
        assert!(!store.unpin(&JobId::new("a")));
    }

    #[test]
    fn batch_is_swapped_atomically() {
        let store = JobStateStore::new();
        let mut rx = store.subscribe();
        let patches = vec![
            JobPatch::from_job(&job("a", JobStatus::Running), Utc::now()),
            JobPatch::from_job(&job("b", JobStatus::Pending), Utc::now()),
        ];
        store.apply_all(&patches, Origin::Stream, store.next_sequence());

        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.version(), 1);
    }

    #[test]
    fn active_jobs_use_retention() {
        let store = JobStateStore::with_retention(Duration::from_secs(0));
        let patches = vec![
            JobPatch::from_job(&job("running", JobStatus::Running), Utc::now()),
            JobPatch::from_job(&job("done", JobStatus::Completed), Utc::now()),
        ];
        store.apply_all(&patches, Origin::BulkPoll, store.next_sequence());

        let active = store.active_jobs(Utc::now());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, JobId::new("running"));
    }
}
