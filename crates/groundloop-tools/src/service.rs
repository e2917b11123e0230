//! HTTP adapter for the remote service the loop automates.
//!
//! The bearer token is read from durable state on every call, so a credential
//! saved mid-turn is used by the very next request.

use groundloop_core::config::ServiceConfig;
use groundloop_core::StateStore;
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("could not build HTTP client: {0}")]
    Client(String),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Clone, Debug)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: String,
}

impl ServiceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

pub struct ServiceClient {
    client: Client,
    endpoints: ServiceConfig,
    state: Arc<StateStore>,
}

impl ServiceClient {
    pub fn new(endpoints: ServiceConfig, state: Arc<StateStore>) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoints.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoints,
            state,
        })
    }

    pub fn endpoints(&self) -> &ServiceConfig {
        &self.endpoints
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoints.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ServiceResponse, ServiceError> {
        self.send(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<ServiceResponse, ServiceError> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<ServiceResponse, ServiceError> {
        let url = self.url(path);
        let mut request = self.client.request(method.clone(), &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = self.state.snapshot().await.credential.filter(|c| !c.is_empty()) {
            request = request.bearer_auth(token);
        }

        let transport = |source| ServiceError::Transport {
            url: url.clone(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;
        debug!("{} {} -> {} ({} bytes)", method, url, status, body.len());

        Ok(ServiceResponse { status, body })
    }
}
