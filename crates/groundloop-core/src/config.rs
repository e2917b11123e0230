//! Loop configuration
//!
//! Everything tunable lives here. Loaded from TOML at startup, falls back to
//! defaults when the file is missing or unreadable.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_SENTINEL: &str = "GOAL_COMPLETE";
pub const DEFAULT_NEXT_MOVE: &str = "What is your next move?";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub run: RunConfig,
    pub paths: PathsConfig,
    pub engine: EngineConfig,
    pub service: ServiceConfig,
    pub verify: VerifyConfig,
    pub bridge: BridgeConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Hard ceiling on iterations. Must be at least 1.
    pub max_iterations: u32,
    /// Literal token the engine emits once the goal is met.
    pub sentinel: String,
    /// The single user message sent at the start of every session.
    pub next_move_message: String,
    pub success_policy: SuccessPolicyKind,
    /// Tool whose result may count as success under `tool-evidence`.
    pub evidence_tool: Option<String>,
    /// Substring that marks the evidence tool's result as a success.
    pub evidence_marker: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuccessPolicyKind {
    #[default]
    SentinelOnly,
    ToolEvidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub goal_file: PathBuf,
    pub skill_file: PathBuf,
    pub state_file: PathBuf,
    /// Root for file tools and the verification command.
    pub workspace_root: PathBuf,
    /// Daily-rolling log files are written here when set.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Model/tool round trips allowed inside one session before it goes idle.
    pub max_tool_rounds: usize,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub register_path: String,
    pub list_path: String,
    pub search_path: String,
    pub create_path: String,
    /// `{post_id}` is replaced with the target post.
    pub comment_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub command: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Provider executable to spawn.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// `host:port` of an already running provider; tried before spawning.
    pub address: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Enabled tool groups: `state`, `service`, `workspace`, `bridge`.
    pub groups: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            sentinel: DEFAULT_SENTINEL.into(),
            next_move_message: DEFAULT_NEXT_MOVE.into(),
            success_policy: SuccessPolicyKind::SentinelOnly,
            evidence_tool: None,
            evidence_marker: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            goal_file: "GOAL.md".into(),
            skill_file: "SKILL.md".into(),
            state_file: "state.json".into(),
            workspace_root: ".".into(),
            log_dir: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".into(),
            max_tokens: 8192,
            max_tool_rounds: 25,
            api_key_env: "ANTHROPIC_API_KEY".into(),
            base_url: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/v1".into(),
            timeout_secs: 30,
            register_path: "/agents/register".into(),
            list_path: "/posts".into(),
            search_path: "/search".into(),
            create_path: "/posts".into(),
            comment_path: "/posts/{post_id}/comments".into(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            command: "cargo test".into(),
            timeout_secs: 600,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            address: None,
            timeout_secs: 60,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            groups: vec!["state".into(), "service".into()],
        }
    }
}

impl LoopConfig {
    /// Read config from a TOML file. `Ok(None)` when the file does not exist;
    /// unreadable or unparsable files are errors so the caller can report them
    /// once logging is up.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&content)
            .map(Some)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match Self::read(path) {
            Ok(Some(config)) => {
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Ok(None) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.max_iterations == 0 {
            return Err(Error::config("run.max_iterations must be at least 1"));
        }
        if self.run.sentinel.trim().is_empty() {
            return Err(Error::config("run.sentinel must not be empty"));
        }
        if self.run.success_policy == SuccessPolicyKind::ToolEvidence
            && (self.run.evidence_tool.is_none() || self.run.evidence_marker.is_none())
        {
            return Err(Error::config(
                "run.success_policy = \"tool-evidence\" needs evidence_tool and evidence_marker",
            ));
        }
        for group in &self.tools.groups {
            if !matches!(group.as_str(), "state" | "service" | "workspace" | "bridge") {
                return Err(Error::config(format!("unknown tool group: {}", group)));
            }
        }
        Ok(())
    }

    pub fn group_enabled(&self, group: &str) -> bool {
        self.tools.groups.iter().any(|g| g == group)
    }

    /// Resolve a configured path against the directory holding the config file.
    pub fn resolve(&self, base: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}
