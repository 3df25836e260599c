//! NBD session management
//!
//! A session is one external process exposing VM disks as a network block
//! device. Sessions are started by a [`DiskExporter`], supervised by a
//! [`SessionHandle`], and fanned out over all disks of a snapshot by the
//! [`Orchestrator`].
//!
//! Two strategies are supported:
//! - per-disk: one `nbdkit` VDDK process per base disk
//! - shared: one `virt-v2v-open` process exposing the whole VM

pub mod credentials;
mod handle;
mod nbdkit;
mod orchestrator;
mod v2v_open;

pub use handle::SessionHandle;
pub use nbdkit::NbdkitExporter;
pub use orchestrator::{Orchestrator, SessionSet};
pub use v2v_open::{V2vOpenExporter, DEFAULT_V2V_OPEN_PORT};

use crate::error::{InspectError, InspectResult};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempPath;
use tokio::sync::Semaphore;
use url::Url;

/// vCenter access details
#[derive(Clone, Default)]
pub struct Credentials {
    pub vcenter_url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("vcenter_url", &self.vcenter_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Snapshot disk layout, as reported by the vSphere inventory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDiskInfo {
    pub vm_moref: String,
    pub snapshot_moref: String,
    /// Current disk paths, possibly snapshot deltas
    pub disk_paths: Vec<String>,
    /// Base disk paths without snapshot deltas
    pub base_disk_paths: Vec<String>,
    /// Host or cluster inventory path, e.g. `/Datacenter/Cluster/host.example.com`
    pub compute_resource_path: String,
}

/// What a single session exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskDescriptor {
    /// One base disk of a snapshot, addressed by managed object references
    Disk {
        vm_moref: String,
        snapshot_moref: String,
        path: String,
    },
    /// The whole VM at a snapshot, addressed by inventory names
    Vm {
        name: String,
        snapshot: String,
        datacenter: String,
    },
}

/// Parsed connection target shared by every session of an inspection
#[derive(Clone)]
pub struct ConnectionContext {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl ConnectionContext {
    /// Validate credentials and extract the vCenter host
    pub fn new(credentials: &Credentials) -> InspectResult<Self> {
        let raw = credentials.vcenter_url.trim();
        if raw.is_empty() {
            return Err(InspectError::MissingValue("vCenter URL".to_string()));
        }

        let parsed = Url::parse(raw)
            .or_else(|_| Url::parse(&format!("https://{}", raw)))
            .map_err(|e| InspectError::InvalidTarget(format!("{}: {}", raw, e)))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| InspectError::InvalidTarget(format!("{}: no host", raw)))?;

        if credentials.username.is_empty() {
            return Err(InspectError::MissingValue("vCenter username".to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("host", &self.host)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Address a session serves NBD on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NbdEndpoint {
    pub host: String,
    pub port: u16,
}

impl NbdEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NbdEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nbd://{}:{}", self.host, self.port)
    }
}

/// Session strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// One nbdkit process per disk
    #[default]
    PerDisk,
    /// One virt-v2v-open process for the VM
    Shared,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::PerDisk => "per-disk",
            SessionMode::Shared => "shared",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to start one exporter process
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub endpoint: NbdEndpoint,
    /// Ephemeral files removed when the session closes
    pub artifacts: Vec<TempPath>,
}

/// Knows how to expose a disk as an NBD endpoint
pub trait DiskExporter: Send + Sync {
    /// Program name for logs and errors
    fn name(&self) -> &str;

    /// Build the command line and auxiliary files for one session
    fn prepare(&self, disk: &DiskDescriptor, conn: &ConnectionContext)
        -> InspectResult<LaunchSpec>;

    /// Permit a session set must hold for its whole lifetime.
    ///
    /// Exporters that always serve on the same address return a shared
    /// single-permit semaphore so only one session set uses it at a time.
    fn exclusive(&self) -> Option<Arc<Semaphore>> {
        None
    }
}
