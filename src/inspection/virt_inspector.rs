//! virt-inspector: whole-guest inspection over NBD

use crate::error::{InspectError, InspectResult};
use crate::inspection::runner::run_tool;
use crate::inspection::xml::parse_virt_inspector;
use crate::inspection::{InspectionTool, ToolKind, VirtInspectorReport};
use crate::session::NbdEndpoint;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// libguestfs `virt-inspector`
#[derive(Debug, Clone)]
pub struct VirtInspector {
    program: PathBuf,
}

impl VirtInspector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, endpoints: &[NbdEndpoint]) -> Command {
        let mut cmd = Command::new(&self.program);
        // The format has to precede each -a
        for endpoint in endpoints {
            cmd.arg("--format=raw").arg("-a").arg(endpoint.to_string());
        }
        // VDDK's bundled libraries break the libguestfs appliance
        cmd.env_remove("LD_LIBRARY_PATH");
        cmd
    }
}

impl Default for VirtInspector {
    fn default() -> Self {
        Self::new("virt-inspector")
    }
}

#[async_trait]
impl InspectionTool for VirtInspector {
    type Output = VirtInspectorReport;

    fn kind(&self) -> ToolKind {
        ToolKind::VirtInspector
    }

    async fn run(
        &self,
        endpoints: &[NbdEndpoint],
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> InspectResult<VirtInspectorReport> {
        if endpoints.is_empty() {
            return Err(InspectError::MissingValue("NBD endpoints".to_string()));
        }

        info!(disk_count = endpoints.len(), "Running virt-inspector on NBD");
        let output = run_tool("virt-inspector", self.command(endpoints), deadline, cancel).await?;
        if !output.stderr.trim().is_empty() {
            debug!(stderr = %output.stderr.trim_end(), "virt-inspector diagnostics");
        }

        parse_virt_inspector(&output.stdout).inspect_err(|e| {
            error!(error = %e, "Failed to parse virt-inspector XML output");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspection::fake_program;

    const REPORT: &str = "<operatingsystems><operatingsystem><name>linux</name><distro>debian</distro><arch>x86_64</arch><major_version>12</major_version><minor_version>0</minor_version></operatingsystem></operatingsystems>";

    #[test]
    fn format_precedes_each_disk() {
        let cmd = VirtInspector::default().command(&[
            NbdEndpoint::new("127.0.0.1", 10809),
            NbdEndpoint::new("127.0.0.1", 10810),
        ]);
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "--format=raw",
                "-a",
                "nbd://127.0.0.1:10809",
                "--format=raw",
                "-a",
                "nbd://127.0.0.1:10810",
            ]
        );
    }

    #[tokio::test]
    async fn parses_tool_output() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_program(dir.path(), &format!("echo '{}'", REPORT));

        let report = VirtInspector::new(program)
            .run(
                &[NbdEndpoint::new("127.0.0.1", 10809)],
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.operating_systems[0].distro, "debian");
    }

    #[test]
    fn library_path_is_removed() {
        let cmd = VirtInspector::default().command(&[NbdEndpoint::new("127.0.0.1", 1)]);
        let removed = cmd
            .as_std()
            .get_envs()
            .any(|(k, v)| k == "LD_LIBRARY_PATH" && v.is_none());
        assert!(removed);
    }

    #[tokio::test]
    async fn empty_output_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_program(dir.path(), "echo '<operatingsystems/>'");

        let err = VirtInspector::new(program)
            .run(
                &[NbdEndpoint::new("127.0.0.1", 10809)],
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::Parse { .. }));
    }

    #[tokio::test]
    async fn requires_endpoints() {
        let err = VirtInspector::default()
            .run(&[], Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::MissingValue(_)));
    }
}
