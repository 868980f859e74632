//! Push stream transports.

use std::pin::Pin;

use async_trait::async_trait;
use reqwest::Method;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use jobsync_core::EventId;
use jobsync_events::{SseDecoder, SseFrame, StreamKey};

use crate::api::{HttpContext, check_status};
use crate::config::ClientConfig;
use crate::error::ClientError;

/// Frames of one open connection. Ends (or yields an error) when the
/// connection drops.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, ClientError>> + Send>>;

#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Open a connection to `key`, resuming after `last_event_id` when given.
    async fn connect(
        &self,
        key: StreamKey,
        last_event_id: Option<&EventId>,
    ) -> Result<FrameStream, ClientError>;
}

/// `text/event-stream` over reqwest.
#[derive(Debug, Clone)]
pub struct HttpEventTransport {
    ctx: HttpContext,
}

impl HttpEventTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        // No overall timeout: the response body is long-lived.
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::config(e.to_string()))?;
        Ok(Self {
            ctx: HttpContext::new(config, client),
        })
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn connect(
        &self,
        key: StreamKey,
        last_event_id: Option<&EventId>,
    ) -> Result<FrameStream, ClientError> {
        let mut req = self
            .ctx
            .request(Method::GET, &format!("/streams/{}", key.path()))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(id) = last_event_id {
            req = req
                .query(&[("lastEventId", id.as_str())])
                .header("Last-Event-ID", id.as_str());
        }

        tracing::debug!(stream = %key, last_event_id = ?last_event_id, "connecting to event stream");
        let resp = check_status(req.send().await?).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(read_frames(resp, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Decode the response body into frames until it ends or the reader goes away.
async fn read_frames(resp: reqwest::Response, tx: mpsc::Sender<Result<SseFrame, ClientError>>) {
    let body = resp.bytes_stream();
    tokio::pin!(body);
    let mut decoder = SseDecoder::new();

    loop {
        let chunk = tokio::select! {
            _ = tx.closed() => return,
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for frame in decoder.feed(&bytes) {
                    if tx.send(Ok(frame)).await.is_err() {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(Err(e.into())).await;
                return;
            }
            None => {
                if let Some(frame) = decoder.finish() {
                    let _ = tx.send(Ok(frame)).await;
                }
                return;
            }
        }
    }
}
