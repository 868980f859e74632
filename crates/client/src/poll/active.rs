use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, watch};

use jobsync_core::{Job, JobId, JobPage, JobPatch, JobQuery, Origin, ResourceId};
use jobsync_store::JobStateStore;

use crate::api::JobsApi;
use crate::poll::PollDecision;

/// Resource → the active job running against it.
///
/// Keyed by id alone: stream events may name a resource without its kind.
pub type ActiveMap = HashMap<ResourceId, JobId>;

/// Map every active job that names a resource. The first job listed for a
/// resource wins.
pub fn active_by_resource(jobs: &[Job]) -> ActiveMap {
    let mut map = ActiveMap::new();
    for job in jobs {
        if let Some(resource) = job.resource.id().filter(|_| job.status.is_active()) {
            map.entry(resource.clone()).or_insert_with(|| job.id.clone());
        }
    }
    map
}

/// True when `job` is active on a resource the poller does not know about.
///
/// `reported` is the resource id an update carried, used when the stored job
/// has no classified resource yet.
pub fn introduces_active_job(map: &ActiveMap, job: &Job, reported: Option<&ResourceId>) -> bool {
    if !job.status.is_active() {
        return false;
    }
    job.resource
        .id()
        .or(reported)
        .is_some_and(|resource| !map.contains_key(resource))
}

/// Polls running jobs and publishes them keyed by resource.
///
/// Keeps polling while anything runs. Once a poll comes back empty it goes
/// idle until [`ActivePoller::waker`] is notified.
pub struct ActivePoller {
    api: Arc<dyn JobsApi>,
    store: Arc<JobStateStore>,
    interval: Duration,
    page_size: u32,
    active: Arc<watch::Sender<ActiveMap>>,
    wake: Arc<Notify>,
}

impl ActivePoller {
    pub fn new(
        api: Arc<dyn JobsApi>,
        store: Arc<JobStateStore>,
        interval: Duration,
        page_size: u32,
    ) -> Self {
        let (active, _) = watch::channel(ActiveMap::new());
        Self {
            api,
            store,
            interval,
            page_size,
            active: Arc::new(active),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn active(&self) -> watch::Receiver<ActiveMap> {
        self.active.subscribe()
    }

    /// Notify to restart polling (or poll early).
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub async fn poll_once(&self) -> PollDecision {
        let query = JobQuery::running(self.page_size);
        let sequence = self.store.next_sequence();
        match self.api.list_jobs(&query).await {
            Ok(page) => {
                let patches: Vec<JobPatch> = page
                    .items
                    .iter()
                    .map(|job| JobPatch::from_job(job, Utc::now()))
                    .collect();
                self.store.apply_all(&patches, Origin::BulkPoll, sequence);
                let decision = decide(&page, self.interval);
                let map = active_by_resource(&page.items);
                tracing::debug!(running = page.items.len(), resources = map.len(), "active poll merged");
                self.active.send_replace(map);
                decision
            }
            Err(err) => {
                tracing::warn!(error = %err, "active poll failed");
                PollDecision::Reschedule(self.interval)
            }
        }
    }

    pub async fn run(self, shutdown: Arc<Notify>) {
        loop {
            let decision = tokio::select! {
                _ = shutdown.notified() => return,
                decision = self.poll_once() => decision,
            };

            match decision {
                PollDecision::Reschedule(delay) => {
                    tokio::select! {
                        _ = shutdown.notified() => return,
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.wake.notified() => {}
                    }
                }
                PollDecision::Stop => {
                    tracing::debug!("no running jobs; active poll idle until stream activity");
                    tokio::select! {
                        _ = shutdown.notified() => return,
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }
    }
}

fn decide(page: &JobPage, interval: Duration) -> PollDecision {
    if page.items.is_empty() {
        PollDecision::Stop
    } else {
        PollDecision::Reschedule(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsync_core::{JobStatus, ResourceRef};

    use crate::testing::{FakeApi, job, page};

    fn start(api: Arc<FakeApi>) -> (Arc<Notify>, watch::Receiver<ActiveMap>, Arc<Notify>) {
        let poller = ActivePoller::new(
            api,
            Arc::new(JobStateStore::new()),
            Duration::from_millis(3000),
            20,
        );
        let wake = poller.waker();
        let active = poller.active();
        let shutdown = Arc::new(Notify::new());
        tokio::spawn(poller.run(shutdown.clone()));
        (wake, active, shutdown)
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_suppresses_polling_until_woken() {
        let api = Arc::new(FakeApi::new());
        let (wake, _, _shutdown) = start(api.clone());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.list_count(), 1);
        assert_eq!(api.list_calls.lock().unwrap()[0].status, Some(JobStatus::Running));

        wake.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(api.list_count(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.list_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedules_while_jobs_run() {
        let api = Arc::new(FakeApi::new());
        let running = job("a", JobStatus::Running, Utc::now());
        api.push_page(Ok(page(vec![running.clone()])));
        api.push_page(Ok(page(vec![running.clone()])));

        let (_, active, _shutdown) = start(api.clone());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(active.borrow().get(running.resource.id().unwrap()), Some(&running.id));

        tokio::time::sleep(Duration::from_secs(30)).await;
        // t=0 and t=3 find work, t=6 comes back empty.
        assert_eq!(api.list_count(), 3);
        assert!(active.borrow().is_empty());
    }

    #[test]
    fn only_unknown_active_resources_are_new() {
        let now = Utc::now();
        let known = job("a", JobStatus::Running, now);
        let map = active_by_resource(std::slice::from_ref(&known));

        assert!(!introduces_active_job(&map, &known, None));
        assert!(introduces_active_job(&map, &job("b", JobStatus::Pending, now), None));
        assert!(!introduces_active_job(&map, &job("c", JobStatus::Completed, now), None));

        let mut detached = job("d", JobStatus::Running, now);
        detached.resource = ResourceRef::None;
        assert!(!introduces_active_job(&map, &detached, None));
        assert!(map.contains_key(&ResourceId::new("env-a")));
    }

    #[test]
    fn reported_resource_id_stands_in_for_an_unclassified_job() {
        let now = Utc::now();
        let map = active_by_resource(&[job("a", JobStatus::Running, now)]);

        let mut unclassified = job("b", JobStatus::Running, now);
        unclassified.resource = ResourceRef::None;
        assert!(introduces_active_job(&map, &unclassified, Some(&ResourceId::new("env-b"))));
        assert!(!introduces_active_job(&map, &unclassified, Some(&ResourceId::new("env-a"))));
    }
}
