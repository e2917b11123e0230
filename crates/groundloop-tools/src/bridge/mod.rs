//! Remote tool bridge — expose a provider process's tools as registry entries
//!
//! Discovery happens once at startup. Every discovered tool becomes a
//! [`RemoteTool`] that forwards `execute` to `tools/call`; the orchestrator
//! cannot tell it apart from a built-in tool.

pub mod protocol;
pub mod transport;

pub use protocol::{CallToolResult, ContentItem, RemoteToolDescriptor};
pub use transport::{BridgeError, BridgeResult, LineTransport, ToolTransport};

use crate::registry::{RegistryError, Tool, ToolRegistry, ToolResult};
use groundloop_core::config::BridgeConfig;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct RemoteToolBridge {
    transport: Arc<dyn ToolTransport>,
    discovered: Vec<RemoteToolDescriptor>,
}

impl RemoteToolBridge {
    pub fn new(transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            transport,
            discovered: Vec::new(),
        }
    }

    /// Connect per config: reuse `address` when something is listening there,
    /// otherwise spawn `command`. Performs the initialize handshake.
    pub async fn connect(config: &BridgeConfig) -> BridgeResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));

        let mut reused = None;
        if let Some(address) = config.address.as_deref().filter(|a| !a.is_empty()) {
            match LineTransport::connect(address, timeout).await {
                Ok(t) => {
                    info!("reusing tool provider at {}", address);
                    reused = Some(t);
                }
                Err(e) if config.command.is_some() => {
                    debug!("{}; spawning provider instead", e);
                }
                Err(e) => return Err(e),
            }
        }

        let transport = match reused {
            Some(t) => t,
            None => {
                let command = config
                    .command
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .ok_or(BridgeError::NotConfigured)?;
                info!("spawning tool provider: {} {}", command, config.args.join(" "));
                LineTransport::spawn(command, &config.args, &config.env, timeout)?
            }
        };

        transport.initialize().await?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Ask the provider for its tool list. Returns how many were advertised.
    pub async fn discover(&mut self) -> BridgeResult<usize> {
        self.discovered = self.transport.list_tools().await?;
        debug!(
            "tool provider advertised: {:?}",
            self.discovered.iter().map(|d| &d.name).collect::<Vec<_>>()
        );
        Ok(self.discovered.len())
    }

    pub fn discovered(&self) -> &[RemoteToolDescriptor] {
        &self.discovered
    }

    /// Add every discovered tool to `registry`. Names already taken by a
    /// static tool are skipped. Returns the number actually added.
    pub fn register_into(&self, registry: &mut ToolRegistry) -> usize {
        let mut added = 0;
        for descriptor in &self.discovered {
            let tool = RemoteTool::new(descriptor.clone(), Arc::clone(&self.transport));
            match registry.register(tool) {
                Ok(()) => added += 1,
                Err(RegistryError::Duplicate(name)) => {
                    warn!("remote tool '{}' shadows an existing tool; skipped", name)
                }
                Err(e) => warn!("remote tool '{}' not registered: {}", descriptor.name, e),
            }
        }
        info!("registered {} remote tool(s)", added);
        added
    }
}

pub struct RemoteTool {
    name: String,
    description: String,
    schema: Value,
    transport: Arc<dyn ToolTransport>,
}

impl RemoteTool {
    pub fn new(descriptor: RemoteToolDescriptor, transport: Arc<dyn ToolTransport>) -> Self {
        let schema = descriptor.schema();
        let description = descriptor
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Remote tool '{}'", descriptor.name));
        Self {
            name: descriptor.name,
            description,
            schema,
            transport,
        }
    }
}

#[async_trait::async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let arguments = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return ToolResult::error(format!(
                    "Arguments for '{}' must be an object, got: {}",
                    self.name, other
                ))
            }
        };

        match self.transport.call_tool(&self.name, arguments).await {
            Ok(result) => {
                let text = result.first_text().unwrap_or("(no output)").to_string();
                if result.is_error {
                    ToolResult::error(text)
                } else {
                    ToolResult::text(text)
                }
            }
            Err(e) => ToolResult::error(format!("remote tool '{}' failed: {}", self.name, e)),
        }
    }
}
