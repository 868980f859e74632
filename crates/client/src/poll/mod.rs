//! Pull-based sources.
//!
//! - [`BulkPoller`]: the paged list, on a fixed interval while a consumer is mounted.
//! - [`ActivePoller`]: running jobs keyed by resource; idles when nothing runs.
//! - [`SinglePoller`]: one job, slowing down with age, until it is terminal.

use std::time::Duration;

pub mod active;
pub mod bulk;
pub mod single;

pub use active::{ActiveMap, ActivePoller, active_by_resource, introduces_active_job};
pub use bulk::BulkPoller;
pub use single::{SinglePoller, single_poll_interval};

/// What a poller does after one round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Reschedule(Duration),
    Stop,
}
