use jobsync_core::{JobId, JobStatus};

/// Errors from talking to the job API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

/// Why a cancellation request was not sent or not accepted.
#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    #[error("job {0} is not known")]
    UnknownJob(JobId),
    #[error("job {job_id} is {status} and can no longer be cancelled")]
    NotCancellable { job_id: JobId, status: JobStatus },
    #[error("a cancellation request for job {0} is already in flight")]
    AlreadyRequested(JobId),
    #[error("cancellation request failed: {0}")]
    Request(#[from] ClientError),
}
