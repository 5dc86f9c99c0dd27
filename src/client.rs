use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::models::{ContactMessage, ContactReceipt, JobApplication, StoredContactMessage};
use crate::store::{EntityStore, StoreError, StoreResult};

const JOBS_PATH: &str = "/api/JobApplications";
const CONTACT_PATH: &str = "/api/contact";
const CONTACT_MESSAGES_PATH: &str = "/api/contact/messages";

/// REST client for a running `jobtrack serve`.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn job_url(&self, id: i64) -> String {
        format!("{}{}/{}", self.base_url, JOBS_PATH, id)
    }

    fn transport(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Transport(err.to_string())
        }
    }

    /// Maps non-2xx answers onto the store taxonomy.
    async fn check(&self, response: Response, id: Option<i64>) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.error)
            .unwrap_or_else(|_| status.to_string());
        debug!(%status, %message, "request rejected");
        Err(match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Validation(message),
            StatusCode::NOT_FOUND => StoreError::NotFound(id.unwrap_or_default()),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => StoreError::Conflict(message),
            _ => StoreError::Transport(format!("server answered {status}: {message}")),
        })
    }

    /// Sends a contact message. Delivery failures come back as a receipt
    /// with `success: false`, not as an error.
    pub async fn send_contact(&self, msg: &ContactMessage) -> StoreResult<ContactReceipt> {
        let response = self
            .http
            .post(self.url(CONTACT_PATH))
            .json(msg)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        if response.status() == StatusCode::BAD_GATEWAY {
            return response.json().await.map_err(|e| self.transport(e));
        }
        let response = self.check(response, None).await?;
        response.json().await.map_err(|e| self.transport(e))
    }

    pub async fn recent_contacts(&self, limit: usize) -> StoreResult<Vec<StoredContactMessage>> {
        let response = self
            .http
            .get(self.url(CONTACT_MESSAGES_PATH))
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let response = self.check(response, None).await?;
        response.json().await.map_err(|e| self.transport(e))
    }
}

#[async_trait]
impl EntityStore for ApiClient {
    async fn list(&self) -> StoreResult<Vec<JobApplication>> {
        let response = self
            .http
            .get(self.url(JOBS_PATH))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let response = self.check(response, None).await?;
        response.json().await.map_err(|e| self.transport(e))
    }

    async fn get(&self, id: i64) -> StoreResult<JobApplication> {
        let response = self
            .http
            .get(self.job_url(id))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let response = self.check(response, Some(id)).await?;
        response.json().await.map_err(|e| self.transport(e))
    }

    async fn create(&self, job: &JobApplication) -> StoreResult<JobApplication> {
        let body = JobApplication {
            id: None,
            ..job.clone()
        };
        let response = self
            .http
            .post(self.url(JOBS_PATH))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let response = self.check(response, None).await?;
        response.json().await.map_err(|e| self.transport(e))
    }

    async fn update(&self, id: i64, job: &JobApplication) -> StoreResult<()> {
        let response = self
            .http
            .put(self.job_url(id))
            .json(job)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.check(response, Some(id)).await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let response = self
            .http
            .delete(self.job_url(id))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.check(response, Some(id)).await?;
        Ok(())
    }
}
