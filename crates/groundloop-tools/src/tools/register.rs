//! Register tool — create an identity on the remote service and keep its credential

use crate::probe::{probe, ACTIVATION_URL_PROBES, CREDENTIAL_PROBES};
use crate::registry::{required_str, truncate, Tool, ToolResult};
use crate::service::ServiceClient;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub struct RegisterTool {
    service: Arc<ServiceClient>,
}

impl RegisterTool {
    pub fn new(service: Arc<ServiceClient>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Tool for RegisterTool {
    fn name(&self) -> &str {
        "register"
    }

    fn description(&self) -> &str {
        "Register a new identity with the remote service. On success the issued \
         credential and identity are saved to durable state. Only needed when \
         state has no credential."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Identity name to register" },
                "description": { "type": "string", "description": "Short public description" }
            },
            "required": ["name", "description"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let name = match required_str(&args, "name") {
            Ok(n) => n.to_string(),
            Err(e) => return e,
        };
        let description = match required_str(&args, "description") {
            Ok(d) => d.to_string(),
            Err(e) => return e,
        };

        let path = &self.service.endpoints().register_path;
        let body = json!({ "name": name, "description": description });
        let response = match self.service.post(path, &body).await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Registration request failed: {}", e)),
        };

        if !response.is_success() {
            warn!("registration rejected: HTTP {}", response.status);
            return ToolResult::error(format!(
                "Registration failed with HTTP {}: {}",
                response.status,
                truncate(&response.body, 2_000)
            ));
        }

        let Some(parsed) = response.json() else {
            return ToolResult::error(format!(
                "Registration returned HTTP {} but the body was not JSON: {}",
                response.status,
                truncate(&response.body, 2_000)
            ));
        };

        let Some(credential) = probe(&parsed, CREDENTIAL_PROBES).map(str::to_string) else {
            return ToolResult::error(format!(
                "Registration returned HTTP {} but no credential was found in: {}",
                response.status,
                truncate(&response.body, 2_000)
            ));
        };
        let activation_url = probe(&parsed, ACTIVATION_URL_PROBES).map(str::to_string);

        let saved = self
            .service
            .state()
            .mutate(|s| {
                s.credential = Some(credential);
                s.identity = Some(name.clone());
                if activation_url.is_some() {
                    s.activation_url = activation_url.clone();
                }
            })
            .await;
        if let Err(e) = saved {
            return ToolResult::error(format!(
                "Registered, but saving the credential failed: {}",
                e
            ));
        }

        info!("registered identity '{}'", name);
        match activation_url {
            Some(url) => ToolResult::text(format!(
                "Registered as '{}'. Credential saved.\nFollow-up action required: {}",
                name, url
            )),
            None => ToolResult::text(format!("Registered as '{}'. Credential saved.", name)),
        }
    }
}
