//! Guest inspection tools
//!
//! An [`InspectionTool`] runs one libguestfs program against a set of NBD
//! endpoints and parses what it prints into a typed report.

mod report;
mod runner;
mod v2v_inspector;
mod virt_inspector;
pub mod xml;

pub use report::{
    Application, Drive, Filesystem, Mountpoint, OperatingSystem, V2vInspectorReport,
    V2vOperatingSystem, VirtInspectorReport,
};
pub use v2v_inspector::VirtV2vInspector;
pub use virt_inspector::VirtInspector;

use crate::error::InspectResult;
use crate::session::NbdEndpoint;
use async_trait::async_trait;
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which inspection program produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    /// virt-inspector
    #[value(name = "virt", alias = "virt-inspector")]
    VirtInspector,
    /// virt-v2v-inspector
    #[value(name = "v2v", alias = "virt-v2v-inspector")]
    VirtV2vInspector,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::VirtInspector => "virt-inspector",
            ToolKind::VirtV2vInspector => "virt-v2v-inspector",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inspection program run against live NBD endpoints
#[async_trait]
pub trait InspectionTool: Send + Sync + 'static {
    /// Parsed result, shared between callers and persisted by the store
    type Output: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn kind(&self) -> ToolKind;

    /// Inspect the guest behind `endpoints`, in disk order
    async fn run(
        &self,
        endpoints: &[NbdEndpoint],
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> InspectResult<Self::Output>;
}

/// Write an executable shell script standing in for an inspection program
#[cfg(test)]
pub(crate) fn fake_program(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-tool");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
