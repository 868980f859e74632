//! Scripted fakes for the transport and API seams.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

use jobsync_core::{EventId, Job, JobId, JobPage, JobQuery, JobStatus, JobType, ResourceId, ResourceRef};
use jobsync_events::{SseFrame, StreamKey};

use crate::api::JobsApi;
use crate::error::ClientError;
use crate::stream::{EventTransport, FrameStream};

pub(crate) fn frame(id: Option<&str>, data: &str) -> SseFrame {
    SseFrame {
        id: id.map(str::to_string),
        event: None,
        data: data.to_string(),
        retry: None,
    }
}

pub(crate) fn job(id: &str, status: JobStatus, created: DateTime<Utc>) -> Job {
    let mut job = Job::new(
        JobId::new(id),
        JobType::EnvironmentSync,
        ResourceRef::Environment(ResourceId::new(format!("env-{id}"))),
        created,
    );
    job.status = status;
    if status.is_terminal() {
        job.timestamps.completed = Some(created);
    }
    job
}

enum Script {
    Frames { frames: Vec<SseFrame>, hold_open: bool },
    Live(mpsc::UnboundedReceiver<SseFrame>),
    Error,
}

#[derive(Debug, Clone)]
pub(crate) struct ConnectCall {
    pub(crate) key: StreamKey,
    pub(crate) last_event_id: Option<EventId>,
    pub(crate) at: Instant,
}

/// Each `connect` pops the next script entry; an exhausted script fails.
#[derive(Default)]
pub(crate) struct FakeTransport {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<ConnectCall>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Deliver `frames`, then end the stream.
    pub(crate) fn push_frames(&self, frames: Vec<SseFrame>) {
        self.script.lock().unwrap().push_back(Script::Frames { frames, hold_open: false });
    }

    /// Deliver `frames`, then stay open.
    pub(crate) fn push_pending(&self, frames: Vec<SseFrame>) {
        self.script.lock().unwrap().push_back(Script::Frames { frames, hold_open: true });
    }

    /// Stay open and deliver whatever is sent on the returned channel.
    pub(crate) fn push_live(&self) -> mpsc::UnboundedSender<SseFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().unwrap().push_back(Script::Live(rx));
        tx
    }

    pub(crate) fn push_error(&self) {
        self.script.lock().unwrap().push_back(Script::Error);
    }

    pub(crate) fn calls(&self) -> Vec<ConnectCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventTransport for FakeTransport {
    async fn connect(
        &self,
        key: StreamKey,
        last_event_id: Option<&EventId>,
    ) -> Result<FrameStream, ClientError> {
        self.calls.lock().unwrap().push(ConnectCall {
            key,
            last_event_id: last_event_id.cloned(),
            at: Instant::now(),
        });
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Frames { frames, hold_open }) => {
                let delivered = tokio_stream::iter(frames.into_iter().map(Ok));
                if hold_open {
                    Ok(Box::pin(delivered.chain(tokio_stream::pending())))
                } else {
                    Ok(Box::pin(delivered))
                }
            }
            Some(Script::Live(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx).map(Ok))),
            Some(Script::Error) | None => Err(ClientError::Network("connection refused".to_string())),
        }
    }
}

/// Scripted [`JobsApi`]. Exhausted list scripts return an empty page; exhausted
/// get scripts repeat the last record served.
#[derive(Default)]
pub(crate) struct FakeApi {
    pages: Mutex<VecDeque<Result<JobPage, ClientError>>>,
    jobs: Mutex<VecDeque<Result<Job, ClientError>>>,
    last_job: Mutex<Option<Job>>,
    cancels: Mutex<VecDeque<Result<(), ClientError>>>,
    cancel_gate: Mutex<Option<Arc<Notify>>>,
    list_latency: Mutex<Option<Duration>>,
    pub(crate) list_calls: Mutex<Vec<JobQuery>>,
    pub(crate) get_calls: AtomicUsize,
    pub(crate) cancel_calls: Mutex<Vec<(JobId, Option<String>)>>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_page(&self, page: Result<JobPage, ClientError>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub(crate) fn push_job(&self, job: Result<Job, ClientError>) {
        self.jobs.lock().unwrap().push_back(job);
    }

    pub(crate) fn push_cancel(&self, result: Result<(), ClientError>) {
        self.cancels.lock().unwrap().push_back(result);
    }

    /// Hold every cancel request until the returned gate is notified.
    pub(crate) fn gate_cancels(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.cancel_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Delay every list response by `latency`.
    pub(crate) fn set_list_latency(&self, latency: Duration) {
        *self.list_latency.lock().unwrap() = Some(latency);
    }

    pub(crate) fn list_count(&self) -> usize {
        self.list_calls.lock().unwrap().len()
    }

    pub(crate) fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn page(items: Vec<Job>) -> JobPage {
    JobPage {
        total: items.len() as u64,
        total_pages: 1,
        items,
    }
}

#[async_trait]
impl JobsApi for FakeApi {
    async fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, ClientError> {
        self.list_calls.lock().unwrap().push(query.clone());
        let latency = *self.list_latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.pages.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(JobPage::default()))
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, ClientError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.jobs.lock().unwrap().pop_front();
        match next {
            Some(Ok(job)) => {
                *self.last_job.lock().unwrap() = Some(job.clone());
                Ok(job)
            }
            Some(Err(err)) => Err(err),
            None => self.last_job.lock().unwrap().clone().ok_or_else(|| ClientError::Api {
                status: 404,
                message: format!("job {} not found", id),
            }),
        }
    }

    async fn cancel_job(&self, id: &JobId, reason: Option<&str>) -> Result<(), ClientError> {
        self.cancel_calls
            .lock()
            .unwrap()
            .push((id.clone(), reason.map(str::to_string)));
        let gate = self.cancel_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let next = self.cancels.lock().unwrap().pop_front();
        next.unwrap_or(Ok(()))
    }
}
