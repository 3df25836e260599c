//! Error types for vmprobe
//!
//! All modules use `InspectResult<T>` as their return type. The error is
//! `Clone` so that every caller waiting on a shared inspection observes the
//! same failure as the caller that ran it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for vmprobe operations
pub type InspectResult<T> = Result<T, InspectError>;

/// Pipeline stage an error belongs to, for operator diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Session,
    Tool,
    Parse,
    Store,
    Cancelled,
    Internal,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Configuration => "configuration",
            Stage::Session => "session setup",
            Stage::Tool => "inspection tool",
            Stage::Parse => "output parsing",
            Stage::Store => "durable store",
            Stage::Cancelled => "cancelled",
            Stage::Internal => "internal",
        }
    }
}

/// All errors that can occur in vmprobe
#[derive(Error, Debug, Clone)]
pub enum InspectError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid connection target: {0}")]
    InvalidTarget(String),

    #[error("Missing required value: {0}")]
    MissingValue(String),

    // Session errors
    #[error("Failed to start {program}: {source}")]
    SessionStart {
        program: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("NBD endpoint {endpoint} not ready after {timeout:?}")]
    SessionNotReady { endpoint: String, timeout: Duration },

    #[error("{program} exited before {endpoint} became ready ({status})")]
    SessionExited {
        program: String,
        endpoint: String,
        status: String,
    },

    #[error("Disk {index}: {source}")]
    Disk {
        index: usize,
        #[source]
        source: Box<InspectError>,
    },

    // Inspection tool errors
    #[error("Failed to run {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("{tool} failed (exit code {}){}", .code.map_or_else(|| "unknown".to_string(), |c| c.to_string()), format_output(.output))]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Failed to parse {tool} output: {reason}")]
    Parse { tool: String, reason: String },

    // Durable store errors
    #[error("Durable store error: {0}")]
    Store(String),

    // Deadline and cancellation
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: String, after: Duration },

    #[error("Inspection cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[source] Arc<toml::ser::Error>),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_output(output: &str) -> String {
    if output.trim().is_empty() {
        String::new()
    } else {
        format!("\nOutput: {}", output.trim_end())
    }
}

impl From<serde_json::Error> for InspectError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(Arc::new(e))
    }
}

impl From<toml::ser::Error> for InspectError {
    fn from(e: toml::ser::Error) -> Self {
        Self::TomlSerialize(Arc::new(e))
    }
}

impl InspectError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a session start error
    pub fn session_start(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::SessionStart {
            program: program.into(),
            source: Arc::new(source),
        }
    }

    /// Create a tool spawn error
    pub fn tool_spawn(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::ToolSpawn {
            tool: tool.into(),
            source: Arc::new(source),
        }
    }

    /// Annotate an error with the index of the disk it occurred on
    pub fn on_disk(self, index: usize) -> Self {
        Self::Disk {
            index,
            source: Box::new(self),
        }
    }

    /// Create a timeout error for a named stage
    pub fn timeout(stage: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            stage: stage.into(),
            after,
        }
    }

    /// Which stage of the pipeline failed
    pub fn stage(&self) -> Stage {
        match self {
            Self::ConfigInvalid { .. } | Self::InvalidTarget(_) | Self::MissingValue(_) => {
                Stage::Configuration
            }
            Self::SessionStart { .. } | Self::SessionNotReady { .. } | Self::SessionExited { .. } => {
                Stage::Session
            }
            Self::Disk { source, .. } => source.stage(),
            Self::ToolSpawn { .. } | Self::ToolFailed { .. } => Stage::Tool,
            Self::Parse { .. } => Stage::Parse,
            Self::Store(_) => Stage::Store,
            Self::Timeout { stage, .. } if stage.starts_with("session") => Stage::Session,
            Self::Timeout { .. } => Stage::Tool,
            Self::Cancelled => Stage::Cancelled,
            Self::Io { .. } | Self::Json(_) | Self::TomlSerialize(_) | Self::Internal(_) => {
                Stage::Internal
            }
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Disk { source, .. } => source.hint(),
            Self::SessionStart { .. } => {
                Some("Check that nbdkit (with the vddk plugin) or virt-v2v-open is installed")
            }
            Self::SessionNotReady { .. } => {
                Some("Increase [session] ready_timeout_secs or check vCenter reachability")
            }
            Self::ToolSpawn { .. } => Some("Install libguestfs-tools / virt-v2v or set the tool path"),
            Self::MissingValue(_) => Some("Pass the value on the command line or set it in config.toml"),
            _ => None,
        }
    }
}
