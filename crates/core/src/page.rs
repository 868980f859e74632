//! Bulk job list request/response shapes.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus, JobType};

/// Query for one page of the bulk job list. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    pub page: u32,
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

impl JobQuery {
    pub fn page(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size,
            job_type: None,
            status: None,
        }
    }

    /// First page of jobs currently running.
    pub fn running(page_size: u32) -> Self {
        Self {
            status: Some(JobStatus::Running),
            ..Self::page(1, page_size)
        }
    }
}

impl Default for JobQuery {
    fn default() -> Self {
        Self::page(1, 20)
    }
}

/// One page of the bulk job list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub items: Vec<Job>,
    pub total: u64,
    pub total_pages: u32,
}
