//! Readiness conditions for asynchronous appliance operations.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::debug;
use vprov_engine::{Readiness, RemoteError, RunContext};

use crate::client::{error_message, RestClient};

/// An HTTP endpoint answering with the expected status.
///
/// Connection errors and any other status just mean "not ready yet"; a
/// freshly deployed appliance refuses connections for a while after boot.
#[derive(Debug, Clone)]
pub struct HttpReadiness {
    client: RestClient,
    url: Url,
    expected: StatusCode,
}

impl HttpReadiness {
    pub fn new(client: RestClient, url: Url) -> Self {
        Self {
            client,
            url,
            expected: StatusCode::OK,
        }
    }

    pub fn expecting(mut self, status: StatusCode) -> Self {
        self.expected = status;
        self
    }
}

#[async_trait]
impl Readiness for HttpReadiness {
    fn describe(&self) -> String {
        format!("{} to answer {}", self.url, self.expected.as_u16())
    }

    async fn check(&self, _ctx: &RunContext) -> Result<bool, RemoteError> {
        match self.client.http().get(self.url.clone()).send().await {
            Ok(resp) => {
                debug!(url = %self.url, status = resp.status().as_u16(), "API answered");
                Ok(resp.status() == self.expected)
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "API not reachable yet");
                Ok(false)
            }
        }
    }
}

/// A long-running task tracked by the appliance.
///
/// The task document is expected to carry a `status` field; `message` is
/// used for the error text when the task fails.
#[derive(Debug, Clone)]
pub struct RemoteTask {
    client: RestClient,
    url: Url,
}

impl RemoteTask {
    pub fn new(client: RestClient, url: Url) -> Self {
        Self { client, url }
    }

    /// Task at a `Location` returned by the server.
    pub fn at(client: RestClient, location: &str) -> Result<Self, RemoteError> {
        let url = client.resolve(location)?;
        Ok(Self::new(client, url))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Readiness for RemoteTask {
    fn describe(&self) -> String {
        format!("task {}", self.url.path())
    }

    async fn check(&self, _ctx: &RunContext) -> Result<bool, RemoteError> {
        let resp = self.client.get(self.url.clone()).await?;
        task_state(&resp.body)
    }
}

fn task_state(body: &Value) -> Result<bool, RemoteError> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase();
    match status.as_str() {
        "success" | "succeeded" | "completed" => Ok(true),
        "error" | "failed" => Err(RemoteError::Failed(format!(
            "task failed: {}",
            error_message(body)
        ))),
        _ => Ok(false),
    }
}
