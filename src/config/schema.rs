//! Configuration schema for vmprobe
//!
//! Configuration is stored at `~/.config/vmprobe/config.toml`

use crate::session::{SessionMode, DEFAULT_V2V_OPEN_PORT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Inspection tool settings
    pub inspector: InspectorConfig,

    /// NBD session settings
    pub session: SessionConfig,

    /// vCenter connection
    pub vcenter: VcenterConfig,

    /// Durable result store
    pub store: StoreConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Inspection tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// virt-inspector binary
    pub virt_inspector_path: PathBuf,

    /// virt-v2v-inspector binary
    pub virt_v2v_inspector_path: PathBuf,

    /// Deadline for session setup and for the tool run, each
    pub timeout_secs: u64,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            virt_inspector_path: PathBuf::from("virt-inspector"),
            virt_v2v_inspector_path: PathBuf::from("virt-v2v-inspector"),
            timeout_secs: 300,
        }
    }
}

/// NBD session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// "per-disk" (nbdkit) or "shared" (virt-v2v-open)
    pub mode: SessionMode,

    /// nbdkit binary
    pub nbdkit_path: PathBuf,

    /// virt-v2v-open binary
    pub v2v_open_path: PathBuf,

    /// Port virt-v2v-open listens on
    pub v2v_open_port: u16,

    /// How long to wait for an endpoint to accept connections
    pub ready_timeout_secs: u64,

    /// Time between SIGTERM and SIGKILL on close
    pub grace_period_ms: u64,

    /// VDDK library directory passed to nbdkit
    pub vddk_libdir: Option<PathBuf>,

    /// vCenter TLS certificate thumbprint
    pub thumbprint: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            nbdkit_path: PathBuf::from("nbdkit"),
            v2v_open_path: PathBuf::from("virt-v2v-open"),
            v2v_open_port: DEFAULT_V2V_OPEN_PORT,
            ready_timeout_secs: 30,
            grace_period_ms: 2000,
            vddk_libdir: None,
            thumbprint: None,
        }
    }
}

/// vCenter connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VcenterConfig {
    /// vCenter URL or host name
    pub url: String,

    /// Login user
    pub username: String,

    /// Environment variable holding the password
    pub password_env: String,
}

impl Default for VcenterConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password_env: "VMPROBE_VCENTER_PASSWORD".to_string(),
        }
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Persist results across runs
    pub enabled: bool,

    /// Store directory (defaults to the state directory)
    pub dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}
