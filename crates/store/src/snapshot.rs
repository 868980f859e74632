//! Immutable store snapshots and the list view derived from them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use jobsync_core::{Job, JobId};

use crate::merge::{JobMap, TrackedJob};
use crate::sequence::Sequence;

/// Membership and totals of the bulk page that is currently displayed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageState {
    /// Job ids in server order.
    pub ids: Vec<JobId>,
    pub total: u64,
    pub total_pages: u32,
    pub page: u32,
    pub page_size: u32,
    /// Sequence of the response that produced this page.
    pub sequence: Sequence,
}

/// One consistent view of every known job.
///
/// Snapshots are replaced whole; a reader holding one never observes a
/// partially applied merge.
#[derive(Debug, Clone, Default)]
pub struct JobSnapshot {
    pub(crate) version: u64,
    pub(crate) jobs: JobMap,
    pub(crate) page: PageState,
    pub(crate) pinned: Vec<JobId>,
}

/// The bulk list as rendered: deep-linked jobs missing from the page come first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListView {
    pub items: Vec<Job>,
    pub total: u64,
    pub total_pages: u32,
}

impl JobSnapshot {
    /// Incremented on every visible change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id).map(|tracked| &tracked.job)
    }

    pub fn tracked(&self, id: &JobId) -> Option<&TrackedJob> {
        self.jobs.get(id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values().map(|tracked| &tracked.job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn page(&self) -> &PageState {
        &self.page
    }

    pub fn pinned(&self) -> &[JobId] {
        &self.pinned
    }

    /// Pending and running jobs, plus jobs that finished less than `retention`
    /// ago so the transition stays visible. Newest first.
    pub fn active_jobs(&self, now: DateTime<Utc>, retention: Duration) -> Vec<&Job> {
        let retention = chrono::Duration::milliseconds(retention.as_millis() as i64);
        let mut active: Vec<&Job> = self
            .jobs()
            .filter(|job| {
                job.status.is_active()
                    || job
                        .timestamps
                        .completed
                        .is_some_and(|completed| now - completed < retention)
            })
            .collect();
        active.sort_by(|a, b| {
            b.timestamps
                .created
                .cmp(&a.timestamps.created)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        active
    }

    /// The current page with pinned jobs prepended when the page lacks them.
    ///
    /// `total` counts the prepended entries so pagination labels stay honest.
    pub fn view(&self) -> JobListView {
        let mut items = Vec::with_capacity(self.pinned.len() + self.page.ids.len());
        let mut extra = 0u64;

        for id in &self.pinned {
            if self.page.ids.contains(id) {
                continue;
            }
            if let Some(job) = self.get(id) {
                items.push(job.clone());
                extra += 1;
            }
        }
        items.extend(self.page.ids.iter().filter_map(|id| self.get(id)).cloned());

        JobListView {
            items,
            total: self.page.total + extra,
            total_pages: self.page.total_pages,
        }
    }
}
