//! Thin JSON client for appliance REST APIs.

use reqwest::header::LOCATION;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use vprov_engine::RemoteError;

use crate::config::RestConfig;

/// Errors building a client.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Successful response.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: StatusCode,
    /// `Location` header, set on `202 Accepted` for long-running operations.
    pub location: Option<String>,
    pub body: Value,
}

impl RestResponse {
    /// The remote system accepted the request and continues asynchronously.
    pub fn task_location(&self) -> Option<&str> {
        if self.status == StatusCode::ACCEPTED {
            self.location.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

/// JSON client bound to one appliance endpoint. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RestClient {
    base: Url,
    http: reqwest::Client,
    auth: Auth,
}

impl RestClient {
    pub fn new(config: &RestConfig) -> Result<Self, RestError> {
        let base = Url::parse(&config.endpoint).map_err(|e| RestError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(RestError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                reason: "not a base URL".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        let auth = match (&config.token, &config.username) {
            (Some(token), _) => Auth::Bearer(token.clone()),
            (None, Some(username)) => Auth::Basic {
                username: username.clone(),
                password: config.password.clone().unwrap_or_default(),
            },
            (None, None) => Auth::None,
        };

        Ok(Self { base, http, auth })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Build a URL below the base from unescaped path segments.
    pub fn url<S: AsRef<str>>(&self, segments: &[S]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments.iter().map(|s| s.as_ref()));
        }
        url
    }

    /// Resolve an absolute URL or a path returned by the server.
    pub fn resolve(&self, location: &str) -> Result<Url, RemoteError> {
        self.base
            .join(location)
            .map_err(|e| RemoteError::Failed(format!("invalid location {}: {}", location, e)))
    }

    pub async fn get(&self, url: Url) -> Result<RestResponse, RemoteError> {
        self.send(Method::GET, url, None).await
    }

    pub async fn post(&self, url: Url, body: &Value) -> Result<RestResponse, RemoteError> {
        self.send(Method::POST, url, Some(body)).await
    }

    pub async fn patch(&self, url: Url, body: &Value) -> Result<RestResponse, RemoteError> {
        self.send(Method::PATCH, url, Some(body)).await
    }

    pub async fn delete(&self, url: Url) -> Result<RestResponse, RemoteError> {
        self.send(Method::DELETE, url, None).await
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.auth {
            Auth::None => req,
            Auth::Basic { username, password } => req.basic_auth(username, Some(password)),
            Auth::Bearer(token) => req.bearer_auth(token),
        }
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<RestResponse, RemoteError> {
        let what = format!("{} {}", method, url.path());
        debug!(request = %what, "Sending request");

        let mut req = self.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RemoteError::Failed(format!("{}: {}", what, e)))?;

        let status = resp.status();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp
            .text()
            .await
            .map_err(|e| RemoteError::Failed(format!("{}: failed to read body: {}", what, e)))?;
        let body = parse_body(&text);

        debug!(request = %what, status = status.as_u16(), "Got response");

        if status.is_success() {
            return Ok(RestResponse {
                status,
                location,
                body,
            });
        }

        let detail = error_message(&body);
        Err(match status {
            StatusCode::NOT_FOUND => RemoteError::NotFound(format!("{}: {}", what, detail)),
            StatusCode::CONFLICT => RemoteError::AlreadyExists(format!("{}: {}", what, detail)),
            _ => RemoteError::Failed(format!("{} returned {}: {}", what, status, detail)),
        })
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Best-effort error text from a response body.
pub(crate) fn error_message(body: &Value) -> String {
    match body {
        Value::Null => "no details".to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) => ["message", "msg", "error"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(endpoint: &str) -> RestClient {
        RestClient::new(&RestConfig::new(endpoint)).unwrap()
    }

    #[test]
    fn url_escapes_segments() {
        let c = client("https://oms.local/api/v1/");
        let url = c.url(&["datacenters", "dc 01", "portgroups"]);
        assert_eq!(url.as_str(), "https://oms.local/api/v1/datacenters/dc%2001/portgroups");
    }

    #[test]
    fn resolve_relative_and_absolute_locations() {
        let c = client("https://oms.local/api/v1");
        assert_eq!(
            c.resolve("/tasks/7").unwrap().as_str(),
            "https://oms.local/tasks/7"
        );
        assert_eq!(
            c.resolve("https://other.local/t/1").unwrap().as_str(),
            "https://other.local/t/1"
        );
    }

    #[test]
    fn invalid_endpoint_rejected() {
        assert!(matches!(
            RestClient::new(&RestConfig::new("not a url")),
            Err(RestError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(error_message(&json!({ "message": "name taken" })), "name taken");
        assert_eq!(error_message(&json!("plain")), "plain");
        assert_eq!(error_message(&Value::Null), "no details");
        assert_eq!(error_message(&json!({ "code": 7 })), "{\"code\":7}");
    }
}
