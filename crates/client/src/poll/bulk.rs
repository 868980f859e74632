use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;

use jobsync_core::JobQuery;
use jobsync_store::JobStateStore;

use crate::api::JobsApi;
use crate::error::ClientError;

/// Polls the displayed page of the bulk list while at least one consumer is
/// mounted. The cadence does not depend on job activity.
pub struct BulkPoller {
    api: Arc<dyn JobsApi>,
    store: Arc<JobStateStore>,
    interval: Duration,
    mounts: watch::Receiver<usize>,
    query: watch::Receiver<JobQuery>,
}

impl BulkPoller {
    pub fn new(
        api: Arc<dyn JobsApi>,
        store: Arc<JobStateStore>,
        interval: Duration,
        mounts: watch::Receiver<usize>,
        query: watch::Receiver<JobQuery>,
    ) -> Self {
        Self {
            api,
            store,
            interval,
            mounts,
            query,
        }
    }

    /// Fetch the current page and merge it.
    pub async fn poll_once(&self) -> Result<(), ClientError> {
        let query = self.query.borrow().clone();
        // Drawn before the request goes out: anything the stream writes while
        // the request is in flight outranks this response.
        let sequence = self.store.next_sequence();
        let page = self.api.list_jobs(&query).await?;
        let outcomes = self.store.apply_page(&query, &page, sequence, Utc::now());
        tracing::debug!(
            page = query.page,
            items = page.items.len(),
            changed = outcomes.iter().filter(|o| o.changed()).count(),
            sequence,
            "bulk poll merged"
        );
        Ok(())
    }

    /// Poll on a fixed cadence measured from request start, so request latency
    /// does not stretch the period.
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if !self.is_mounted() {
                tokio::select! {
                    _ = shutdown.notified() => return,
                    mounted = self.wait_for_mount() => {
                        if !mounted {
                            return;
                        }
                    }
                }
                ticker.reset_immediately();
            }

            tokio::select! {
                _ = shutdown.notified() => return,
                _ = ticker.tick() => {}
                changed = self.query.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    ticker.reset();
                }
            }
            if !self.is_mounted() {
                continue;
            }

            tokio::select! {
                _ = shutdown.notified() => return,
                result = self.poll_once() => {
                    if let Err(err) = result {
                        tracing::warn!(error = %err, "bulk poll failed; keeping last snapshot");
                    }
                }
            }
        }
    }

    fn is_mounted(&mut self) -> bool {
        *self.mounts.borrow_and_update() > 0
    }

    /// Resolves `false` when the mount counter is gone.
    async fn wait_for_mount(&mut self) -> bool {
        loop {
            if self.mounts.changed().await.is_err() {
                return false;
            }
            if self.is_mounted() {
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsync_core::{JobId, JobStatus};

    use crate::testing::{FakeApi, job, page};

    struct Harness {
        api: Arc<FakeApi>,
        store: Arc<JobStateStore>,
        mounts: watch::Sender<usize>,
        query: watch::Sender<JobQuery>,
        shutdown: Arc<Notify>,
    }

    fn start() -> Harness {
        let api = Arc::new(FakeApi::new());
        let store = Arc::new(JobStateStore::new());
        let (mounts, mounts_rx) = watch::channel(0usize);
        let (query, query_rx) = watch::channel(JobQuery::default());
        let shutdown = Arc::new(Notify::new());
        let poller = BulkPoller::new(
            api.clone(),
            store.clone(),
            Duration::from_millis(5000),
            mounts_rx,
            query_rx,
        );
        tokio::spawn(poller.run(shutdown.clone()));
        Harness {
            api,
            store,
            mounts,
            query,
            shutdown,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_fixed_interval_only_while_mounted() {
        let h = start();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(h.api.list_count(), 0);

        h.mounts.send_replace(1);
        tokio::time::sleep(Duration::from_millis(12_000)).await;
        assert_eq!(h.api.list_count(), 3);

        h.mounts.send_replace(0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.api.list_count(), 3);

        h.mounts.send_replace(2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.api.list_count(), 4);
        h.shutdown.notify_one();
    }

    #[tokio::test(start_paused = true)]
    async fn request_latency_does_not_stretch_the_period() {
        let h = start();
        h.api.set_list_latency(Duration::from_millis(1500));
        h.mounts.send_replace(1);

        // Requests start at 0, 5 and 10 s even though each takes 1.5 s.
        tokio::time::sleep(Duration::from_millis(11_000)).await;
        assert_eq!(h.api.list_count(), 3);
        h.shutdown.notify_one();
    }

    #[tokio::test(start_paused = true)]
    async fn page_change_polls_immediately() {
        let h = start();
        h.mounts.send_replace(1);
        tokio::time::sleep(Duration::from_millis(100)).await;

        h.query.send_replace(JobQuery::page(2, 20));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let calls = h.api.list_calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].page, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_last_good_snapshot() {
        let h = start();
        h.api.push_page(Ok(page(vec![job("job-1", JobStatus::Running, Utc::now())])));
        h.api.push_page(Err(ClientError::Network("reset".to_string())));

        h.mounts.send_replace(1);
        tokio::time::sleep(Duration::from_millis(6000)).await;

        assert_eq!(h.api.list_count(), 2);
        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.page().ids, vec![JobId::new("job-1")]);
        assert_eq!(
            snapshot.get(&JobId::new("job-1")).unwrap().status,
            JobStatus::Running
        );
    }
}
