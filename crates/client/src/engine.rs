//! Wiring of every source into one store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use jobsync_core::{JobId, JobQuery, Origin};
use jobsync_events::{StreamEvent, StreamKey};
use jobsync_store::{JobListView, JobSnapshot, JobStateStore};

use crate::api::{HttpJobsApi, JobsApi};
use crate::cancel::{CancelRequested, CancellationCoordinator};
use crate::config::ClientConfig;
use crate::error::{CancelError, ClientError};
use crate::poll::{ActiveMap, ActivePoller, BulkPoller, SinglePoller, introduces_active_job};
use crate::stream::{ConnectionStatus, EventTransport, HttpEventTransport, StreamConnection};

/// A spawned source with its own shutdown signal.
struct Worker {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Arc<Notify>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(f(shutdown.clone()));
        Self { shutdown, handle }
    }

    async fn stop(self) {
        self.shutdown.notify_one();
        let _ = self.handle.await;
    }
}

/// Keeps the bulk poll running while alive.
pub struct MountGuard {
    mounts: Arc<watch::Sender<usize>>,
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        self.mounts.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// The job synchronization layer: one store fed by push streams and polls.
///
/// Must be started inside a tokio runtime.
pub struct JobSync {
    api: Arc<dyn JobsApi>,
    store: Arc<JobStateStore>,
    cancel: CancellationCoordinator,
    mounts: Arc<watch::Sender<usize>>,
    query: watch::Sender<JobQuery>,
    active: watch::Receiver<ActiveMap>,
    streams: Vec<StreamConnection>,
    workers: Vec<Worker>,
    watched: Mutex<HashMap<JobId, Worker>>,
}

impl JobSync {
    /// Connect to the API described by `config` over HTTP.
    pub fn start(config: ClientConfig, streams: &[StreamKey]) -> Result<Self, ClientError> {
        let api = Arc::new(HttpJobsApi::new(&config)?);
        let transport = Arc::new(HttpEventTransport::new(&config)?);
        Ok(Self::with_parts(config, api, transport, streams))
    }

    pub fn with_parts<T: EventTransport>(
        config: ClientConfig,
        api: Arc<dyn JobsApi>,
        transport: Arc<T>,
        streams: &[StreamKey],
    ) -> Self {
        let store = Arc::new(JobStateStore::with_retention(config.retention));
        let (mounts, mounts_rx) = watch::channel(0usize);
        let mounts = Arc::new(mounts);
        let (query, query_rx) = watch::channel(JobQuery::page(1, config.page_size));

        let active_poller = ActivePoller::new(
            api.clone(),
            store.clone(),
            config.active_poll_interval,
            config.page_size,
        );
        let active = active_poller.active();
        let wake = active_poller.waker();

        let connections = streams
            .iter()
            .map(|&key| {
                let handler = stream_handler(key, store.clone(), active.clone(), wake.clone());
                StreamConnection::open(transport.clone(), key, None, config.reconnect.clone(), handler)
            })
            .collect();

        let bulk = BulkPoller::new(
            api.clone(),
            store.clone(),
            config.bulk_poll_interval,
            mounts_rx,
            query_rx,
        );
        let workers = vec![
            Worker::spawn(|shutdown| bulk.run(shutdown)),
            Worker::spawn(|shutdown| active_poller.run(shutdown)),
        ];

        tracing::info!(
            tenant_id = %config.tenant_id,
            streams = streams.len(),
            "job sync started"
        );

        Self {
            cancel: CancellationCoordinator::new(api.clone(), store.clone()),
            api,
            store,
            mounts,
            query,
            active,
            streams: connections,
            workers,
            watched: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<JobStateStore> {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<JobSnapshot>> {
        self.store.subscribe()
    }

    pub fn view(&self) -> JobListView {
        self.store.snapshot().view()
    }

    /// Register a consumer of the bulk list.
    pub fn mount(&self) -> MountGuard {
        self.mounts.send_modify(|n| *n += 1);
        MountGuard {
            mounts: self.mounts.clone(),
        }
    }

    /// Change the displayed page; polled right away.
    pub fn set_query(&self, query: JobQuery) {
        self.query.send_replace(query);
    }

    /// Deep-link interest: keep `id` visible and poll it until terminal.
    pub fn watch_job(&self, id: JobId) {
        self.store.pin(&id);
        let mut watched = self.lock_watched();
        if watched.contains_key(&id) {
            return;
        }
        let poller = SinglePoller::new(self.api.clone(), self.store.clone(), id.clone());
        tracing::debug!(job_id = %id, "watching job");
        watched.insert(id, Worker::spawn(|shutdown| poller.run(shutdown)));
    }

    pub fn unwatch_job(&self, id: &JobId) {
        self.store.unpin(id);
        if let Some(worker) = self.lock_watched().remove(id) {
            worker.shutdown.notify_one();
        }
    }

    pub async fn request_cancel(
        &self,
        id: &JobId,
        reason: Option<&str>,
    ) -> Result<CancelRequested, CancelError> {
        self.cancel.request_cancel(id, reason).await
    }

    pub fn is_cancellable(&self, id: &JobId) -> bool {
        self.cancel.is_cancellable(id)
    }

    pub fn connection_status(&self) -> Vec<(StreamKey, ConnectionStatus)> {
        self.streams
            .iter()
            .map(|conn| (conn.key(), conn.status()))
            .collect()
    }

    pub fn active_by_resource(&self) -> ActiveMap {
        self.active.borrow().clone()
    }

    /// Stop every stream and poller and wait for them.
    pub async fn shutdown(self) {
        let JobSync {
            streams,
            workers,
            watched,
            ..
        } = self;
        for conn in streams {
            conn.close().await;
        }
        let watched = watched.into_inner().unwrap_or_else(PoisonError::into_inner);
        for worker in workers.into_iter().chain(watched.into_values()) {
            worker.stop().await;
        }
        tracing::info!("job sync stopped");
    }

    fn lock_watched(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Worker>> {
        self.watched.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Route one connection's events into the store.
fn stream_handler(
    key: StreamKey,
    store: Arc<JobStateStore>,
    active: watch::Receiver<ActiveMap>,
    wake: Arc<Notify>,
) -> impl FnMut(StreamEvent) + Send + 'static {
    move |event| {
        let sequence = store.next_sequence();
        let event_type = event.event_type.clone();
        let patches = match event.into_patches(key, Utc::now()) {
            Ok(patches) => patches,
            Err(err) => {
                tracing::debug!(stream = %key, error = %err, "dropping unroutable stream event");
                return;
            }
        };
        if patches.is_empty() {
            return;
        }

        let outcomes = store.apply_all(&patches, Origin::Stream, sequence);
        tracing::trace!(stream = %key, event_type = %event_type, sequence, outcomes = ?outcomes, "stream event merged");

        let snapshot = store.snapshot();
        let known = active.borrow();
        let wakes = patches.iter().any(|patch| {
            snapshot
                .get(&patch.id)
                .is_some_and(|job| introduces_active_job(&known, job, patch.resource_id()))
        });
        if wakes {
            wake.notify_one();
        }
    }
}
