//! Shared handles passed into tool constructors at registry build time

use crate::service::ServiceClient;
use groundloop_core::config::VerifyConfig;
use groundloop_core::StateStore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct ToolContext {
    pub state: Arc<StateStore>,
    /// Present only when the `service` group is enabled.
    pub service: Option<Arc<ServiceClient>>,
    /// File tools and the verification command are confined to this directory.
    pub workspace_root: PathBuf,
    pub verify: VerifyConfig,
}

impl ToolContext {
    pub fn new(state: Arc<StateStore>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            state,
            service: None,
            workspace_root: workspace_root.into(),
            verify: VerifyConfig::default(),
        }
    }

    pub fn with_service(mut self, service: Arc<ServiceClient>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_verify(mut self, verify: VerifyConfig) -> Self {
        self.verify = verify;
        self
    }
}
