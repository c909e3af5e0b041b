//! Shell execution tool.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{optional_str, required_str, Tool, ToolOutcome};

/// Default command timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Cap on captured stdout/stderr bytes.
const MAX_OUTPUT_BYTES: usize = 500_000;

/// Runs a shell command and returns stdout/stderr.
pub struct ShellTool {
    workspace_root: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ShellTool {
    /// Create the tool rooted at `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its stdout/stderr. Usable for builds, tests, git, and any other CLI work."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run."
                },
                "workdir": {
                    "type": "string",
                    "description": "Working directory; defaults to the workspace root."
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds; defaults to 60."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: &Value) -> ToolOutcome {
        let command = match required_str(arguments, "command") {
            Ok(command) => command,
            Err(outcome) => return outcome,
        };

        let workdir = optional_str(arguments, "workdir")
            .map_or_else(|| self.workspace_root.clone(), PathBuf::from);

        let timeout = arguments
            .get("timeout")
            .and_then(Value::as_f64)
            .filter(|secs| *secs > 0.0)
            .map_or(self.timeout, Duration::from_secs_f64);

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&workdir)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolOutcome::failure(format!("failed to run the command: {e}")),
            Err(_) => {
                return ToolOutcome::failure(format!(
                    "command did not finish within {}s",
                    timeout.as_secs_f64()
                ));
            }
        };

        let stdout_len = output.stdout.len();
        let stderr_len = output.stderr.len();
        let stdout = truncate_utf8(&output.stdout, self.max_output_bytes);
        let stderr = truncate_utf8(&output.stderr, self.max_output_bytes);

        let combined = match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout,
            (true, false) => stderr,
            (false, false) => format!("{stdout}\n--- stderr ---\n{stderr}"),
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let outcome = if output.status.success() {
            ToolOutcome::success(combined)
        } else {
            let mut failed = ToolOutcome::failure(format!("process exited with code {exit_code}"));
            failed.output = combined;
            failed
        };

        outcome
            .with_meta("exit_code", exit_code)
            .with_meta("stdout_bytes", stdout_len)
            .with_meta("stderr_bytes", stderr_len)
    }
}

/// Lossily decode up to `cap` bytes.
fn truncate_utf8(bytes: &[u8], cap: usize) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(cap)]).into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
