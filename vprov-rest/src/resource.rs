//! Probe and actions for a resource collection exposed over REST.
//!
//! Layout convention: the target scope maps onto nested path segments and
//! the resource lives in a named collection below it:
//!
//! ```text
//! {endpoint}/{scope kind}/{scope name}/.../{collection}/{name}
//! ```
//!
//! `GET` on a container path must answer 404 when the container is missing,
//! which is reported as a missing dependency.

use std::fmt;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use vprov_engine::{
    Action, ActionResult, Attributes, Observation, Probe, RemoteError, RunContext, ScopeSegment,
    TargetIdentity,
};

use crate::client::{RestClient, RestResponse};
use crate::readiness::{HttpReadiness, RemoteTask};

/// Unescaped path segments of a resource, below the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath(Vec<String>);

impl ResourcePath {
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

fn scope_segments(scope: &[ScopeSegment]) -> Vec<String> {
    scope
        .iter()
        .flat_map(|s| [s.kind.clone(), s.name.clone()])
        .collect()
}

/// Named resource collection of an appliance API.
#[derive(Debug, Clone)]
pub struct RestResource {
    client: RestClient,
    collection: String,
    readiness_url: Option<Url>,
}

impl RestResource {
    pub fn new(client: RestClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
            readiness_url: None,
        }
    }

    /// After a successful create, wait for `url` to answer 200.
    pub fn with_readiness_url(mut self, url: Url) -> Self {
        self.readiness_url = Some(url);
        self
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }

    fn collection_segments(&self, target: &TargetIdentity) -> Vec<String> {
        let mut segments = scope_segments(&target.scope);
        segments.push(self.collection.clone());
        segments
    }

    pub fn resource_path(&self, target: &TargetIdentity) -> ResourcePath {
        let mut segments = self.collection_segments(target);
        segments.push(target.name.clone());
        ResourcePath(segments)
    }

    /// Turn a mutating response into an action result, tracking a task if
    /// the server continues asynchronously.
    fn finish(&self, resp: RestResponse, fallback: Value) -> Result<ActionResult, RemoteError> {
        let result = if resp.body.is_null() {
            fallback
        } else {
            resp.body.clone()
        };
        let mut out = ActionResult::changed(result);
        if let Some(location) = resp.task_location() {
            debug!(location, "Request accepted, tracking task");
            out = out.then_wait_for(RemoteTask::at(self.client.clone(), location)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl Probe for RestResource {
    type Handle = ResourcePath;

    async fn observe(
        &self,
        _ctx: &RunContext,
        target: &TargetIdentity,
        _desired: &Attributes,
    ) -> Result<Observation<ResourcePath>, RemoteError> {
        for depth in 1..=target.scope.len() {
            let url = self.client.url(&scope_segments(&target.scope[..depth]));
            match self.client.get(url).await {
                Ok(_) => {}
                Err(RemoteError::NotFound(_)) => {
                    let seg = &target.scope[depth - 1];
                    return Err(RemoteError::MissingDependency(format!(
                        "{} {} not found",
                        seg.kind, seg.name
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        let path = self.resource_path(target);
        match self.client.get(self.client.url(path.segments())).await {
            Ok(resp) => match resp.body {
                Value::Object(map) => Ok(Observation::Present {
                    attributes: map.into_iter().collect(),
                    handle: path,
                }),
                other => Err(RemoteError::Failed(format!(
                    "unexpected response for {}: {}",
                    path, other
                ))),
            },
            Err(RemoteError::NotFound(_)) => Ok(Observation::Absent),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Action for RestResource {
    type Handle = ResourcePath;

    async fn create(
        &self,
        _ctx: &RunContext,
        target: &TargetIdentity,
        attributes: &Attributes,
    ) -> Result<ActionResult, RemoteError> {
        let mut body: Map<String, Value> = attributes.clone().into_iter().collect();
        body.insert("name".to_string(), Value::String(target.name.clone()));

        let url = self.client.url(&self.collection_segments(target));
        info!(collection = %self.collection, name = %target.name, "Creating resource");
        let resp = self.client.post(url, &Value::Object(body)).await?;

        let mut out = self.finish(resp, json!({ "name": target.name }))?;
        if let Some(url) = &self.readiness_url {
            out = out.then_wait_for(HttpReadiness::new(self.client.clone(), url.clone()));
        }
        Ok(out)
    }

    async fn update(
        &self,
        _ctx: &RunContext,
        handle: &ResourcePath,
        changes: &Attributes,
    ) -> Result<ActionResult, RemoteError> {
        let body: Map<String, Value> = changes.clone().into_iter().collect();
        info!(resource = %handle, "Updating resource");
        let resp = self
            .client
            .patch(self.client.url(handle.segments()), &Value::Object(body))
            .await?;
        self.finish(resp, json!({ "path": handle.to_string() }))
    }

    async fn delete(
        &self,
        _ctx: &RunContext,
        handle: &ResourcePath,
    ) -> Result<ActionResult, RemoteError> {
        info!(resource = %handle, "Deleting resource");
        let resp = self.client.delete(self.client.url(handle.segments())).await?;
        self.finish(resp, json!({ "path": handle.to_string() }))
    }
}
