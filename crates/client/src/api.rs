//! Job API client.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use jobsync_core::{Job, JobId, JobPage, JobQuery, TenantId};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::retry::RetryPolicy;

pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// Pull side of the job API.
#[async_trait]
pub trait JobsApi: Send + Sync {
    /// `GET /jobs`: one page of the bulk list.
    async fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, ClientError>;

    /// `GET /jobs/{id}`: one full record.
    async fn get_job(&self, id: &JobId) -> Result<Job, ClientError>;

    /// `POST /jobs/{id}/cancel`: ask the worker to stop. Not retried.
    async fn cancel_job(&self, id: &JobId, reason: Option<&str>) -> Result<(), ClientError>;
}

/// Shared request context for everything that talks to the API over HTTP.
#[derive(Debug, Clone)]
pub(crate) struct HttpContext {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) tenant_id: TenantId,
    pub(crate) token: Option<String>,
}

impl HttpContext {
    pub(crate) fn new(config: &ClientConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: config.api_url.clone(),
            tenant_id: config.tenant_id,
            token: config.auth_token.clone(),
        }
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .client
            .request(method, url)
            .header(TENANT_HEADER, self.tenant_id.to_string());
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }
}

/// Map a non-2xx response to [`ClientError::Api`].
pub(crate) async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

/// reqwest-backed [`JobsApi`].
#[derive(Debug, Clone)]
pub struct HttpJobsApi {
    ctx: HttpContext,
    retry: RetryPolicy,
}

impl HttpJobsApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::config(e.to_string()))?;
        Ok(Self {
            ctx: HttpContext::new(config, client),
            retry: config.http_retry.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<T, ClientError> {
        let build = &build;
        self.retry
            .run(what, move || async move {
                let resp = check_status(build().send().await?).await?;
                Ok(resp.json::<T>().await?)
            })
            .await
    }
}

#[async_trait]
impl JobsApi for HttpJobsApi {
    async fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, ClientError> {
        self.get_json("list_jobs", || self.ctx.request(Method::GET, "/jobs").query(query))
            .await
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, ClientError> {
        let path = format!("/jobs/{}", id);
        self.get_json("get_job", || self.ctx.request(Method::GET, &path))
            .await
    }

    async fn cancel_job(&self, id: &JobId, reason: Option<&str>) -> Result<(), ClientError> {
        let body = match reason {
            Some(reason) => serde_json::json!({ "reason": reason }),
            None => serde_json::json!({}),
        };
        let resp = self
            .ctx
            .request(Method::POST, &format!("/jobs/{}/cancel", id))
            .json(&body)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}
