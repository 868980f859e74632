//! Client configuration.

use std::time::Duration;

use jobsync_core::TenantId;
use jobsync_store::DEFAULT_RETENTION;

use crate::error::ClientError;
use crate::retry::RetryPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_BULK_POLL_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the job API, without trailing slash.
    pub api_url: String,
    pub tenant_id: TenantId,
    pub auth_token: Option<String>,
    /// Stream reconnect schedule.
    pub reconnect: RetryPolicy,
    pub bulk_poll_interval: Duration,
    pub active_poll_interval: Duration,
    pub page_size: u32,
    /// How long finished jobs stay in the active working set.
    pub retention: Duration,
    /// Retry schedule for poll requests.
    pub http_retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, tenant_id: TenantId) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            tenant_id,
            auth_token: None,
            reconnect: RetryPolicy::reconnect(DEFAULT_RECONNECT_DELAY),
            bulk_poll_interval: DEFAULT_BULK_POLL_INTERVAL,
            active_poll_interval: DEFAULT_ACTIVE_POLL_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
            retention: DEFAULT_RETENTION,
            http_retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect = RetryPolicy::reconnect(delay);
        self
    }

    /// Read configuration from `JOBSYNC_*` environment variables.
    ///
    /// `JOBSYNC_TENANT_ID` is required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Like [`ClientConfig::from_env`], reading variables through `var`.
    ///
    /// A `JOBSYNC_PAGE_SIZE` of 0 is raised to 1.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let api_url = var("JOBSYNC_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let tenant_id = var("JOBSYNC_TENANT_ID")
            .ok_or_else(|| ClientError::config("JOBSYNC_TENANT_ID must be set"))?
            .trim()
            .parse::<TenantId>()
            .map_err(|e| ClientError::config(e.to_string()))?;

        let mut config = Self::new(api_url, tenant_id);
        if let Some(token) = var("JOBSYNC_AUTH_TOKEN").filter(|t| !t.is_empty()) {
            config.auth_token = Some(token);
        }
        if let Some(ms) = parse_u64(&var, "JOBSYNC_RECONNECT_MS")? {
            config.reconnect = RetryPolicy::reconnect(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_u64(&var, "JOBSYNC_BULK_POLL_MS")? {
            config.bulk_poll_interval = Duration::from_millis(ms);
        }
        if let Some(size) = parse_u64(&var, "JOBSYNC_PAGE_SIZE")? {
            config.page_size = u32::try_from(size)
                .map_err(|_| ClientError::config("JOBSYNC_PAGE_SIZE out of range"))?
                .max(1);
        }
        Ok(config)
    }
}

fn parse_u64(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>, ClientError> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ClientError::config(format!("{}: {}", name, e))),
        None => Ok(None),
    }
}
