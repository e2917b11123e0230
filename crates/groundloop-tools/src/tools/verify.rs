//! Verification tool — run the configured check command in the workspace

use crate::registry::{truncate, Tool, ToolResult};
use groundloop_core::config::VerifyConfig;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

const MAX_SECTION: usize = 15_000;

pub struct RunVerificationTool {
    workspace_root: PathBuf,
    command: String,
    timeout: Duration,
}

impl RunVerificationTool {
    pub fn new(workspace_root: impl AsRef<Path>, config: &VerifyConfig) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait::async_trait]
impl Tool for RunVerificationTool {
    fn name(&self) -> &str {
        "run_verification"
    }

    fn description(&self) -> &str {
        "Run the project's verification command (tests) in the workspace and \
         report PASSED or FAILED with the captured output."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        debug!("run_verification: {}", self.command);

        let mut child = match Command::new("bash")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.workspace_root)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ToolResult::error(format!("Failed to spawn verification: {}", e)),
        };

        // Drain both pipes while waiting so a chatty command cannot block on a full pipe.
        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return ToolResult::error(format!("Failed to wait: {}", e)),
            Err(_) => {
                let _ = child.kill().await;
                return ToolResult::error(format!(
                    "Verification timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
        };

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        let code = status.code().unwrap_or(-1);
        info!("verification finished with exit code {}", code);

        ToolResult::text(format_report(status.success(), code, &stdout, &stderr))
    }
}

async fn read_pipe(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    use tokio::io::AsyncReadExt;
    match pipe {
        Some(mut p) => {
            let mut buf = Vec::new();
            let _ = p.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        }
        None => String::new(),
    }
}

fn format_report(success: bool, code: i32, stdout: &str, stderr: &str) -> String {
    let mut report = if success {
        format!("PASSED (exit code {})", code)
    } else {
        format!("FAILED (exit code {})", code)
    };
    if !stdout.trim().is_empty() {
        report.push_str("\n\n--- stdout ---\n");
        report.push_str(&truncate(stdout.trim(), MAX_SECTION));
    }
    if !stderr.trim().is_empty() {
        report.push_str("\n\n--- stderr ---\n");
        report.push_str(&truncate(stderr.trim(), MAX_SECTION));
    }
    report
}
