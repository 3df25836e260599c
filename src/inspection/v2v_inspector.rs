//! virt-v2v-inspector: conversion-oriented inspection over NBD

use crate::error::{InspectError, InspectResult};
use crate::inspection::runner::run_tool;
use crate::inspection::xml::parse_v2v_inspector;
use crate::inspection::{InspectionTool, ToolKind, V2vInspectorReport};
use crate::session::NbdEndpoint;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// `virt-v2v-inspector`, reading the exported disks as raw input
#[derive(Debug, Clone)]
pub struct VirtV2vInspector {
    program: PathBuf,
}

impl VirtV2vInspector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, endpoints: &[NbdEndpoint]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-i").arg("disk");
        cmd.args(endpoints.iter().map(ToString::to_string));
        cmd.env_remove("LD_LIBRARY_PATH");
        cmd
    }
}

impl Default for VirtV2vInspector {
    fn default() -> Self {
        Self::new("virt-v2v-inspector")
    }
}

#[async_trait]
impl InspectionTool for VirtV2vInspector {
    type Output = V2vInspectorReport;

    fn kind(&self) -> ToolKind {
        ToolKind::VirtV2vInspector
    }

    async fn run(
        &self,
        endpoints: &[NbdEndpoint],
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> InspectResult<V2vInspectorReport> {
        if endpoints.is_empty() {
            return Err(InspectError::MissingValue("NBD endpoints".to_string()));
        }

        info!(disk_count = endpoints.len(), "Running virt-v2v-inspector on NBD");
        let output = run_tool(
            "virt-v2v-inspector",
            self.command(endpoints),
            deadline,
            cancel,
        )
        .await?;

        parse_v2v_inspector(&output.stdout).inspect_err(|e| {
            error!(error = %e, "Failed to parse virt-v2v-inspector XML output");
        })
    }
}
