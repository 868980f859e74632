//! `jobsync-core` — job model building blocks.
//!
//! This crate contains **pure data** primitives shared by every source that
//! reports job state (no IO, no async).

pub mod error;
pub mod id;
pub mod job;
pub mod page;
pub mod patch;

pub use error::DomainError;
pub use id::{EventId, JobId, ResourceId, TenantId};
pub use job::{Job, JobFailure, JobStatus, JobType, Progress, ResourceKind, ResourceRef, Timestamps};
pub use page::{JobPage, JobQuery};
pub use patch::{JobPatch, Origin};
