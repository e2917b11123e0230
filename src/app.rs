//! Wiring: config → state → tool context → registry (+ bridge) → engine → loop

use anyhow::Context;
use groundloop_agent::{
    Engine, LlmEngine, LlmEngineConfig, LoopSettings, PromptSource, SessionOrchestrator,
};
use groundloop_core::config::EngineConfig;
use groundloop_core::{LoopConfig, RunReport, StateStore};
use groundloop_llm::AnthropicProvider;
use groundloop_tools::{
    create_static_registry, RemoteToolBridge, ServiceClient, ToolContext, ToolRegistry,
    GROUP_BRIDGE, GROUP_SERVICE,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Command-line values that win over the config file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub max_iterations: Option<u32>,
    pub workspace: Option<PathBuf>,
    pub api_key: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut LoopConfig) {
        if let Some(n) = self.max_iterations {
            config.run.max_iterations = n;
        }
        if let Some(ws) = &self.workspace {
            config.paths.workspace_root = ws.clone();
        }
    }
}

/// Everything the loop needs except the engine.
pub struct App {
    pub config: LoopConfig,
    pub base_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub state: Arc<StateStore>,
    pub tools: Arc<ToolRegistry>,
    pub bridged_tools: usize,
}

impl App {
    /// Build state, tools and bridge. `base_dir` anchors relative paths
    /// (normally the directory holding the config file).
    pub async fn assemble(config: LoopConfig, base_dir: &Path) -> anyhow::Result<Self> {
        config.validate()?;

        let workspace_root = config.resolve(base_dir, &config.paths.workspace_root);
        let workspace_root = workspace_root.canonicalize().with_context(|| {
            format!("workspace root {} is not accessible", workspace_root.display())
        })?;

        let state_path = config.resolve(base_dir, &config.paths.state_file);
        let state = Arc::new(StateStore::load(state_path).await);

        let mut ctx =
            ToolContext::new(state.clone(), &workspace_root).with_verify(config.verify.clone());
        if config.group_enabled(GROUP_SERVICE) {
            let client = ServiceClient::new(config.service.clone(), state.clone())?;
            ctx = ctx.with_service(Arc::new(client));
        }

        let mut registry = create_static_registry(&ctx, &config.tools.groups)?;

        let mut bridged_tools = 0;
        if config.group_enabled(GROUP_BRIDGE) {
            bridged_tools = attach_bridge(&config, &mut registry).await;
        }

        info!(
            "registry ready: {} tool(s) [{}]",
            registry.len(),
            registry.list().join(", ")
        );

        Ok(Self {
            config,
            base_dir: base_dir.to_path_buf(),
            workspace_root,
            state,
            tools: Arc::new(registry),
            bridged_tools,
        })
    }

    pub fn orchestrator(&self, engine: Arc<dyn Engine>) -> SessionOrchestrator {
        let paths = &self.config.paths;
        SessionOrchestrator::new(
            PromptSource::File(self.config.resolve(&self.base_dir, &paths.goal_file)),
            PromptSource::File(self.config.resolve(&self.base_dir, &paths.skill_file)),
            self.state.clone(),
            self.tools.clone(),
            engine,
            LoopSettings::from_config(&self.config.run),
        )
    }

    pub async fn run(&self, engine: Arc<dyn Engine>) -> anyhow::Result<RunReport> {
        let report = self.orchestrator(engine).run().await?;
        Ok(report)
    }
}

/// Connect the remote bridge and add its tools. Failure leaves the static
/// tools in place.
async fn attach_bridge(config: &LoopConfig, registry: &mut ToolRegistry) -> usize {
    let mut bridge = match RemoteToolBridge::connect(&config.bridge).await {
        Ok(b) => b,
        Err(e) => {
            warn!("tool bridge unavailable, continuing with static tools: {}", e);
            return 0;
        }
    };
    match bridge.discover().await {
        Ok(0) => {
            info!("tool provider advertised no tools");
            0
        }
        Ok(_) => bridge.register_into(registry),
        Err(e) => {
            warn!("tool discovery failed, continuing with static tools: {}", e);
            0
        }
    }
}

/// The production engine: Anthropic Messages API behind the tool-round loop.
pub fn build_engine(config: &EngineConfig, api_key: Option<String>) -> anyhow::Result<Arc<dyn Engine>> {
    let api_key = api_key
        .or_else(|| std::env::var(&config.api_key_env).ok())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no API key: set {} or pass --api-key",
                config.api_key_env
            )
        })?;

    let mut provider = AnthropicProvider::new(api_key);
    if let Some(url) = &config.base_url {
        provider = provider.with_base_url(url.clone());
    }
    Ok(Arc::new(LlmEngine::new(
        Arc::new(provider),
        LlmEngineConfig::from(config),
    )))
}

/// Directory that relative config paths are resolved against.
pub fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
