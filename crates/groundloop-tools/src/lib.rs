//! groundloop tools — registry, side-effect adapters and the remote tool bridge
//!
//! Each built-in tool is a self-contained file in src/tools/. Tools are
//! bundled into groups; a deployment enables the groups it needs and the
//! registry builder below wires them to the shared [`ToolContext`].

pub mod bridge;
pub mod context;
pub mod probe;
pub mod registry;
pub mod service;
pub mod tools;

pub use bridge::{BridgeError, LineTransport, RemoteTool, RemoteToolBridge, ToolTransport};
pub use context::ToolContext;
pub use registry::{RegistryError, Tool, ToolRegistry, ToolResult};
pub use service::{ServiceClient, ServiceError, ServiceResponse};

use std::sync::Arc;

pub const GROUP_STATE: &str = "state";
pub const GROUP_SERVICE: &str = "service";
pub const GROUP_WORKSPACE: &str = "workspace";
pub const GROUP_BRIDGE: &str = "bridge";

/// Build the static registry for the enabled groups.
///
/// State tools are always present: every prompt tells the engine to inspect
/// state first. The `bridge` group is connected separately because discovery
/// is async and allowed to fail.
pub fn create_static_registry(
    ctx: &ToolContext,
    groups: &[String],
) -> Result<ToolRegistry, RegistryError> {
    let enabled = |g: &str| groups.iter().any(|x| x == g);
    let mut registry = ToolRegistry::new();

    register_state_tools(&mut registry, ctx)?;

    if enabled(GROUP_SERVICE) {
        let service = ctx
            .service
            .clone()
            .ok_or_else(|| RegistryError::GroupUnavailable {
                group: GROUP_SERVICE.to_string(),
                reason: "no service client configured".to_string(),
            })?;
        register_service_tools(&mut registry, service)?;
    }

    if enabled(GROUP_WORKSPACE) {
        register_workspace_tools(&mut registry, ctx)?;
    }

    Ok(registry)
}

pub fn register_state_tools(
    registry: &mut ToolRegistry,
    ctx: &ToolContext,
) -> Result<(), RegistryError> {
    registry.register(tools::state::InspectStateTool::new(ctx.state.clone()))?;
    registry.register(tools::state::SaveCredentialTool::new(ctx.state.clone()))?;
    registry.register(tools::state::SetStatusTool::new(ctx.state.clone()))?;
    Ok(())
}

pub fn register_service_tools(
    registry: &mut ToolRegistry,
    service: Arc<ServiceClient>,
) -> Result<(), RegistryError> {
    registry.register(tools::register::RegisterTool::new(service.clone()))?;
    registry.register(tools::service::ListItemsTool::new(service.clone()))?;
    registry.register(tools::service::SearchTool::new(service.clone()))?;
    registry.register(tools::service::CreatePostTool::new(service.clone()))?;
    registry.register(tools::service::AddCommentTool::new(service))?;
    Ok(())
}

pub fn register_workspace_tools(
    registry: &mut ToolRegistry,
    ctx: &ToolContext,
) -> Result<(), RegistryError> {
    let root = &ctx.workspace_root;
    registry.register(tools::files::ReadFileTool::new(root))?;
    registry.register(tools::files::WriteFileTool::new(root))?;
    registry.register(tools::files::ListFilesTool::new(root))?;
    registry.register(tools::verify::RunVerificationTool::new(root, &ctx.verify))?;
    Ok(())
}
