//! Cross-source merge reducer.
//!
//! Rules, applied per patch:
//!
//! 1. **Terminal lock**: once a job is terminal every further patch is rejected.
//! 2. **Forward-only status**: a status is taken only if it moves the job
//!    strictly forward along `pending → running → terminal`.
//! 3. **Sequence-stamped overlay**: every other field present in the patch is
//!    written only if the patch sequence is at least the sequence that last
//!    wrote that field. Absent fields are never touched.
//! 4. `completed` exists iff the status is terminal; `error` only on `failed`.

use std::collections::HashMap;

use jobsync_core::{Job, JobId, JobPatch, JobStatus, JobType, Origin, ResourceKind, ResourceRef};

use crate::sequence::Sequence;

/// A job field tracked by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    JobType,
    Status,
    Resource,
    Current,
    Total,
    Percentage,
    Message,
    CurrentStep,
    Created,
    Started,
    Completed,
    Error,
    Result,
}

impl Field {
    pub const COUNT: usize = 13;

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::JobType => "job_type",
            Field::Status => "status",
            Field::Resource => "resource",
            Field::Current => "progress.current",
            Field::Total => "progress.total",
            Field::Percentage => "progress.percentage",
            Field::Message => "progress.message",
            Field::CurrentStep => "progress.current_step",
            Field::Created => "timestamps.created",
            Field::Started => "timestamps.started",
            Field::Completed => "timestamps.completed",
            Field::Error => "error",
            Field::Result => "result",
        }
    }
}

/// Sequence that last wrote each field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldStamps([Sequence; Field::COUNT]);

impl FieldStamps {
    pub fn get(&self, field: Field) -> Sequence {
        self.0[field.index()]
    }

    fn accepts(&self, field: Field, sequence: Sequence) -> bool {
        sequence >= self.get(field)
    }

    /// Raise the stamp; returns whether it moved.
    fn stamp(&mut self, field: Field, sequence: Sequence) -> bool {
        let slot = &mut self.0[field.index()];
        if sequence > *slot {
            *slot = sequence;
            true
        } else {
            false
        }
    }
}

/// A stored job plus the bookkeeping the overlay needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJob {
    pub job: Job,
    pub stamps: FieldStamps,
    pub last_origin: Origin,
    /// Highest sequence that wrote anything.
    pub last_sequence: Sequence,
}

pub type JobMap = HashMap<JobId, TrackedJob>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The stored job already reached this terminal status.
    TerminalLocked(JobStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First observation of the job.
    Created,
    /// These fields changed value.
    Updated(Vec<Field>),
    /// Nothing visible changed (stale or duplicate patch).
    Unchanged,
    Rejected(RejectReason),
}

impl MergeOutcome {
    /// True when the stored job's visible state changed.
    pub fn changed(&self) -> bool {
        matches!(self, MergeOutcome::Created | MergeOutcome::Updated(_))
    }
}

/// Merge `patch` into `current`, returning the next map and what happened.
///
/// Pure: `current` is never modified.
pub fn merge(
    current: &JobMap,
    patch: &JobPatch,
    origin: Origin,
    sequence: Sequence,
) -> (JobMap, MergeOutcome) {
    let (next, outcome) = merge_job(current.get(&patch.id), patch, origin, sequence);
    let mut map = current.clone();
    if let Some(next) = next {
        map.insert(patch.id.clone(), next);
    }
    (map, outcome)
}

/// Merge one patch into one stored job.
///
/// Returns the replacement entry when anything was written (values or field
/// stamps), `None` when the stored entry stays as it is.
pub fn merge_job(
    existing: Option<&TrackedJob>,
    patch: &JobPatch,
    origin: Origin,
    sequence: Sequence,
) -> (Option<TrackedJob>, MergeOutcome) {
    match existing {
        Some(tracked) if tracked.job.is_terminal() => (
            None,
            MergeOutcome::Rejected(RejectReason::TerminalLocked(tracked.job.status)),
        ),
        Some(tracked) => {
            let mut next = tracked.clone();
            let written = overlay(&mut next, patch, sequence);
            if written.changed.is_empty() && !written.stamped {
                return (None, MergeOutcome::Unchanged);
            }
            next.last_origin = origin;
            next.last_sequence = next.last_sequence.max(sequence);
            let outcome = if written.changed.is_empty() {
                MergeOutcome::Unchanged
            } else {
                MergeOutcome::Updated(written.changed)
            };
            (Some(next), outcome)
        }
        None => {
            let created = patch.created.unwrap_or(patch.observed_at);
            let mut next = TrackedJob {
                job: Job::new(patch.id.clone(), JobType::Unknown, ResourceRef::None, created),
                stamps: FieldStamps::default(),
                last_origin: origin,
                last_sequence: sequence,
            };
            overlay(&mut next, patch, sequence);
            (Some(next), MergeOutcome::Created)
        }
    }
}

#[derive(Debug, Default)]
struct Written {
    changed: Vec<Field>,
    stamped: bool,
}

struct Writer<'a> {
    stamps: &'a mut FieldStamps,
    sequence: Sequence,
    written: Written,
}

impl Writer<'_> {
    fn write<T: PartialEq + Clone>(&mut self, field: Field, dst: &mut T, src: &T) {
        if !self.stamps.accepts(field, self.sequence) {
            return;
        }
        if self.stamps.stamp(field, self.sequence) {
            self.written.stamped = true;
        }
        if dst != src {
            *dst = src.clone();
            self.written.changed.push(field);
        }
    }

    fn write_present<T: PartialEq + Clone>(
        &mut self,
        field: Field,
        dst: &mut Option<T>,
        src: &Option<T>,
    ) {
        if src.is_some() {
            self.write(field, dst, src);
        }
    }

    /// Record a write that bypasses the sequence check (status advances).
    fn force(&mut self, field: Field) {
        if self.stamps.stamp(field, self.sequence) {
            self.written.stamped = true;
        }
        self.written.changed.push(field);
    }
}

fn overlay(tracked: &mut TrackedJob, patch: &JobPatch, sequence: Sequence) -> Written {
    let TrackedJob { job, stamps, .. } = tracked;
    let mut w = Writer {
        stamps,
        sequence,
        written: Written::default(),
    };

    // Status moves forward regardless of sequence: a later lifecycle step is
    // never stale.
    if let Some(status) = patch.status {
        if job.status.advances_to(status) {
            job.status = status;
            w.force(Field::Status);
        }
    }

    if let Some(job_type) = &patch.job_type {
        w.write(Field::JobType, &mut job.job_type, job_type);
    }
    if let Some(resource) = &patch.resource {
        w.write(Field::Resource, &mut job.resource, resource);
    } else if let Some(id) = &patch.resource_id {
        let kind = job.resource.kind();
        if kind != ResourceKind::None {
            w.write(Field::Resource, &mut job.resource, &ResourceRef::new(kind, id.clone()));
        }
    }

    w.write_present(Field::Current, &mut job.progress.current, &patch.progress.current);
    w.write_present(Field::Total, &mut job.progress.total, &patch.progress.total);
    w.write_present(
        Field::Percentage,
        &mut job.progress.percentage,
        &patch.progress.percentage,
    );
    w.write_present(Field::Message, &mut job.progress.message, &patch.progress.message);
    w.write_present(
        Field::CurrentStep,
        &mut job.progress.current_step,
        &patch.progress.current_step,
    );

    if let Some(created) = &patch.created {
        w.write(Field::Created, &mut job.timestamps.created, created);
    }
    w.write_present(Field::Started, &mut job.timestamps.started, &patch.started);

    if job.status.is_terminal() {
        w.write_present(Field::Completed, &mut job.timestamps.completed, &patch.completed);
        if job.timestamps.completed.is_none() {
            job.timestamps.completed = Some(patch.observed_at);
            w.force(Field::Completed);
        }
    }
    if job.status == JobStatus::Failed {
        w.write_present(Field::Error, &mut job.error, &patch.error);
    }

    w.write_present(Field::Result, &mut job.result, &patch.result);

    w.written
}
