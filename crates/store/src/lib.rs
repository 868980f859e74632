//! `jobsync-store` — the authoritative in-memory job projection.
//!
//! Every source (push stream, bulk poll, single-job poll) produces
//! [`jobsync_core::JobPatch`]es stamped with a [`Sequence`] from one shared
//! [`SequenceClock`]. [`merge`] folds a patch into the current map as a pure
//! function; [`JobStateStore`] owns the map and publishes immutable
//! [`JobSnapshot`]s by atomic swap.

pub mod merge;
pub mod sequence;
pub mod snapshot;
pub mod store;

pub use merge::{Field, FieldStamps, JobMap, MergeOutcome, RejectReason, TrackedJob, merge, merge_job};
pub use sequence::{Sequence, SequenceClock};
pub use snapshot::{JobListView, JobSnapshot, PageState};
pub use store::{DEFAULT_RETENTION, JobStateStore};
