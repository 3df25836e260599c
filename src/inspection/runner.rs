//! Running an inspection tool process under a deadline

use crate::error::{InspectError, InspectResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Lines of tool output kept in error messages
const ERROR_TAIL_LINES: usize = 50;

/// Captured output of a successful tool run
#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `cmd` to completion, capturing its output.
///
/// The child is killed if the deadline passes or `cancel` fires first.
/// A non-zero exit is reported with the tail of the combined output.
pub(crate) async fn run_tool(
    tool: &str,
    mut cmd: Command,
    deadline: Duration,
    cancel: &CancellationToken,
) -> InspectResult<ToolOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if cancel.is_cancelled() {
        return Err(InspectError::Cancelled);
    }

    let child = cmd.spawn().map_err(|e| InspectError::tool_spawn(tool, e))?;
    debug!(tool, pid = child.id(), "Inspection tool started");

    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(InspectError::Cancelled),
        result = tokio::time::timeout(deadline, child.wait_with_output()) => match result {
            Ok(output) => output.map_err(|e| InspectError::io(format!("waiting for {}", tool), e))?,
            Err(_) => {
                error!(tool, ?deadline, "Inspection tool timed out");
                return Err(InspectError::timeout(tool, deadline));
            }
        },
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let tail = output_tail(&stdout, &stderr);
        error!(tool, code = ?output.status.code(), "Inspection tool failed");
        return Err(InspectError::ToolFailed {
            tool: tool.to_string(),
            code: output.status.code(),
            output: tail,
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

/// Last lines of stdout followed by stderr
fn output_tail(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}
