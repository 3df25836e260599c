//! Inspect command - inspect one VM snapshot and print the report as JSON

use crate::cache::CacheKey;
use crate::cli::args::InspectArgs;
use crate::config::Config;
use crate::error::InspectResult;
use crate::inspection::{InspectionTool, ToolKind};
use crate::inspector::{InspectionTarget, Inspector, InspectorSet};
use crate::session::SnapshotDiskInfo;
use crate::ui::{TaskSpinner, UiContext};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Execute the inspect command
pub async fn execute(args: InspectArgs, config: &Config) -> InspectResult<()> {
    let mut config = config.clone();
    if let Some(mode) = args.mode {
        config.session.mode = mode;
    }

    let inspectors = InspectorSet::from_config(&config, config.credentials()).await?;
    let key = CacheKey::new(&args.vm, &args.snapshot);
    let target = InspectionTarget {
        datacenter: args.datacenter,
        disks: SnapshotDiskInfo {
            vm_moref: args.vm_moref,
            snapshot_moref: args.snapshot_moref,
            disk_paths: args.disks.clone(),
            base_disk_paths: args.disks,
            compute_resource_path: String::new(),
        },
    };

    // Ctrl-C cancels the inspection; sessions are still closed
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cleaning up sessions");
            on_interrupt.cancel();
        }
    });

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    let tool = args.tool;
    spinner.start(&format!(
        "Inspecting {} with {} ({} sessions)",
        key, tool, config.session.mode
    ));

    let result = match tool {
        ToolKind::VirtInspector => render(&inspectors.virt, &key, &target, &cancel).await,
        ToolKind::VirtV2vInspector => render(&inspectors.v2v, &key, &target, &cancel).await,
    };

    match result {
        Ok(json) => {
            spinner.stop(&format!("Inspected {}", key));
            println!("{}", json);
            Ok(())
        }
        Err(e) => {
            spinner.stop_error(&format!("{} failed during {}", tool, e.stage().name()));
            Err(e)
        }
    }
}

async fn render<T: InspectionTool>(
    inspector: &Inspector<T>,
    key: &CacheKey,
    target: &InspectionTarget,
    cancel: &CancellationToken,
) -> InspectResult<String> {
    let report = inspector.inspect(key, target, cancel).await?;
    Ok(serde_json::to_string_pretty(&*report)?)
}
