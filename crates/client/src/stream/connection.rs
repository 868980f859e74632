//! Reconnecting push connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use jobsync_core::EventId;
use jobsync_events::{SseFrame, StreamEvent, StreamKey, decode_frame};

use crate::retry::RetryPolicy;
use crate::stream::state::{ConnectionState, ConnectionStatus, Transition};
use crate::stream::transport::{EventTransport, FrameStream};

/// Handle to a running connection task.
///
/// Dropping the handle closes the connection and cancels any pending
/// reconnect.
pub struct StreamConnection {
    key: StreamKey,
    status: watch::Receiver<ConnectionStatus>,
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl StreamConnection {
    /// Start a connection task for `key`.
    ///
    /// `handler` is the single consumer of decoded events and is called in
    /// stream order. An event counts as processed once `handler` returns.
    pub fn open<T, H>(
        transport: Arc<T>,
        key: StreamKey,
        last_event_id: Option<EventId>,
        policy: RetryPolicy,
        handler: H,
    ) -> Self
    where
        T: EventTransport + ?Sized,
        H: FnMut(StreamEvent) + Send + 'static,
    {
        let (status_tx, status) = watch::channel(ConnectionStatus::closed(last_event_id.clone()));
        let shutdown = Arc::new(Notify::new());
        let driver = Driver {
            transport,
            key,
            policy,
            handler,
            status_tx,
            shutdown: shutdown.clone(),
            state: ConnectionState::Closed,
            attempt_count: 0,
            last_event_id,
        };
        let task = tokio::spawn(driver.run());

        Self {
            key,
            status,
            shutdown,
            task: Some(task),
        }
    }

    pub fn key(&self) -> StreamKey {
        self.key
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Stop the connection and wait for its task to finish.
    pub async fn close(mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.shutdown.notify_one();
            task.abort();
        }
    }
}

enum Pumped {
    Shutdown,
    Dropped(String),
}

struct Driver<T: ?Sized, H> {
    transport: Arc<T>,
    key: StreamKey,
    policy: RetryPolicy,
    handler: H,
    status_tx: watch::Sender<ConnectionStatus>,
    shutdown: Arc<Notify>,
    state: ConnectionState,
    attempt_count: u32,
    last_event_id: Option<EventId>,
}

impl<T, H> Driver<T, H>
where
    T: EventTransport + ?Sized,
    H: FnMut(StreamEvent) + Send + 'static,
{
    async fn run(mut self) {
        loop {
            let step = if self.state == ConnectionState::Backoff {
                Transition::Retry
            } else {
                Transition::Connect
            };
            self.transition(step);

            let connected = tokio::select! {
                _ = self.shutdown.notified() => break,
                connected = self.transport.connect(self.key, self.last_event_id.as_ref()) => connected,
            };

            match connected {
                Ok(frames) => {
                    self.attempt_count = 0;
                    self.transition(Transition::Opened);
                    tracing::info!(stream = %self.key, last_event_id = ?self.last_event_id, "event stream open");
                    match self.pump(frames).await {
                        Pumped::Shutdown => break,
                        Pumped::Dropped(reason) => {
                            tracing::warn!(stream = %self.key, reason = %reason, "event stream dropped");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(stream = %self.key, attempt = self.attempt_count + 1, error = %err, "event stream connect failed");
                }
            }

            self.attempt_count = self.attempt_count.saturating_add(1);
            self.transition(Transition::Failed);
            if !self.policy.should_retry(self.attempt_count - 1) {
                tracing::error!(stream = %self.key, attempts = self.attempt_count, "giving up on event stream");
                break;
            }

            let delay = self.policy.delay_for_attempt(self.attempt_count);
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(Transition::Close);
        tracing::debug!(stream = %self.key, "event stream closed");
    }

    async fn pump(&mut self, mut frames: FrameStream) -> Pumped {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.notified() => return Pumped::Shutdown,
                next = frames.next() => next,
            };
            match next {
                Some(Ok(frame)) => self.dispatch(frame),
                Some(Err(err)) => return Pumped::Dropped(err.to_string()),
                None => return Pumped::Dropped("end of stream".to_string()),
            }
        }
    }

    fn dispatch(&mut self, frame: SseFrame) {
        let frame_id = frame.id.as_deref().filter(|id| !id.is_empty()).map(EventId::from);

        if let Some(ms) = frame.retry {
            let delay = Duration::from_millis(ms);
            if delay != self.policy.base_delay {
                tracing::debug!(stream = %self.key, retry_ms = ms, "server set reconnect delay");
                self.policy = self.policy.clone().with_base_delay(delay);
            }
        }

        match decode_frame(&frame) {
            Ok(Some(event)) => (self.handler)(event),
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(stream = %self.key, frame_id = ?frame_id, error = %err, "dropping malformed stream frame");
                return;
            }
        }

        if let Some(id) = frame_id {
            self.last_event_id = Some(id);
            self.publish();
        }
    }

    fn transition(&mut self, transition: Transition) {
        match self.state.apply(transition) {
            Ok(next) => {
                self.state = next;
                self.publish();
            }
            Err(err) => tracing::error!(stream = %self.key, error = %err, "stream state machine"),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(ConnectionStatus {
            state: self.state,
            attempt_count: self.attempt_count,
            last_event_id: self.last_event_id.clone(),
        });
    }
}
