//! `jobsync-client` — the live job synchronization layer.
//!
//! A [`JobSync`] owns one [`jobsync_store::JobStateStore`] and feeds it from:
//!
//! - a reconnecting push connection per [`jobsync_events::StreamKey`]
//!   ([`stream::StreamConnection`]),
//! - the bulk list poll, while at least one consumer is mounted,
//! - the active-jobs poll, while anything is running,
//! - one single-job poll per deep-linked job, until it is terminal.
//!
//! Cancellation goes through [`cancel::CancellationCoordinator`], which never
//! writes to the store.

pub mod api;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod poll;
pub mod retry;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{HttpJobsApi, JobsApi};
pub use cancel::{CancelRequested, CancellationCoordinator};
pub use config::ClientConfig;
pub use engine::{JobSync, MountGuard};
pub use error::{CancelError, ClientError};
pub use poll::{ActiveMap, PollDecision};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use stream::{ConnectionState, ConnectionStatus, EventTransport, HttpEventTransport, StreamConnection};
