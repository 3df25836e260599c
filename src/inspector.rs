//! Inspection coordinator
//!
//! An [`Inspector`] answers "what is inside this VM snapshot" for one tool.
//! Lookups go volatile tier, then a single shared computation per key that
//! re-checks memory, tries the durable store, and finally opens sessions
//! and runs the tool. Failures are returned to every waiter and never
//! cached.

use crate::cache::{CacheKey, InflightTracker, Role, TieredCache};
use crate::config::Config;
use crate::error::{InspectError, InspectResult};
use crate::inspection::{
    InspectionTool, ToolKind, V2vInspectorReport, VirtInspector, VirtInspectorReport,
    VirtV2vInspector,
};
use crate::session::{
    ConnectionContext, Credentials, DiskExporter, NbdkitExporter, Orchestrator, SessionMode,
    SnapshotDiskInfo, V2vOpenExporter,
};
use crate::store::{DurableStore, FileStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where a snapshot lives, beyond its cache key
#[derive(Debug, Clone, Default)]
pub struct InspectionTarget {
    pub datacenter: String,
    pub disks: SnapshotDiskInfo,
}

/// Deduplicating, two-tier cached front of one inspection tool
pub struct Inspector<T: InspectionTool> {
    tool: T,
    cache: TieredCache<T::Output>,
    inflight: InflightTracker<Arc<T::Output>>,
    orchestrator: Orchestrator,
    credentials: Credentials,
    timeout: Duration,
}

impl<T: InspectionTool> Inspector<T> {
    pub fn new(
        tool: T,
        orchestrator: Orchestrator,
        credentials: Credentials,
        timeout: Duration,
        durable: Option<Arc<dyn DurableStore<T::Output>>>,
    ) -> Self {
        let cache = TieredCache::new(tool.kind(), durable);
        Self {
            tool,
            cache,
            inflight: InflightTracker::new(),
            orchestrator,
            credentials,
            timeout,
        }
    }

    pub fn kind(&self) -> ToolKind {
        self.tool.kind()
    }

    pub fn cache(&self) -> &TieredCache<T::Output> {
        &self.cache
    }

    /// Inspect the snapshot identified by `key`.
    ///
    /// Concurrent calls for the same key share one computation and observe
    /// the same result.
    pub async fn inspect(
        &self,
        key: &CacheKey,
        target: &InspectionTarget,
        cancel: &CancellationToken,
    ) -> InspectResult<Arc<T::Output>> {
        if let Some(hit) = self.cache.get(key) {
            debug!(
                tool = %self.kind(),
                vm_name = key.vm_name(),
                snapshot_name = key.snapshot_name(),
                "Inspection data found in memory cache"
            );
            return Ok(hit);
        }

        let (result, role) = self
            .inflight
            .run(key, || self.resolve(key, target, cancel))
            .await;

        if role == Role::Waiter {
            debug!(
                tool = %self.kind(),
                vm_name = key.vm_name(),
                snapshot_name = key.snapshot_name(),
                success = result.is_ok(),
                "Waited for inflight inspection to complete"
            );
        }
        result
    }

    async fn resolve(
        &self,
        key: &CacheKey,
        target: &InspectionTarget,
        cancel: &CancellationToken,
    ) -> InspectResult<Arc<T::Output>> {
        // A previous executor may have finished between our lookup and registration
        if let Some(hit) = self.cache.get(key) {
            debug!(
                tool = %self.kind(),
                vm_name = key.vm_name(),
                snapshot_name = key.snapshot_name(),
                "Inspection data found in memory cache (double-check)"
            );
            return Ok(hit);
        }

        if let Some(hit) = self.cache.load(key).await {
            return Ok(hit);
        }

        info!(
            tool = %self.kind(),
            vm_name = key.vm_name(),
            snapshot_name = key.snapshot_name(),
            mode = %self.orchestrator.mode(),
            "Performing new inspection"
        );

        let report = Arc::new(self.compute(key, target, cancel).await?);
        self.cache.store(key, Arc::clone(&report)).await;
        Ok(report)
    }

    async fn compute(
        &self,
        key: &CacheKey,
        target: &InspectionTarget,
        cancel: &CancellationToken,
    ) -> InspectResult<T::Output> {
        let conn = ConnectionContext::new(&self.credentials)?;
        let disks = self.orchestrator.descriptors(
            key.vm_name(),
            key.snapshot_name(),
            &target.datacenter,
            &target.disks,
        )?;

        // Session setup gets its own deadline, enforced through cancellation
        // so the orchestrator still rolls back gracefully
        let setup = cancel.child_token();
        let open = self.orchestrator.open_all(&disks, &conn, &setup);
        tokio::pin!(open);
        let opened = tokio::select! {
            opened = &mut open => opened,
            _ = tokio::time::sleep(self.timeout) => {
                setup.cancel();
                open.await
            }
        };

        let sessions = match opened {
            Ok(sessions) => sessions,
            Err(_) if setup.is_cancelled() && !cancel.is_cancelled() => {
                return Err(InspectError::timeout("session setup", self.timeout));
            }
            Err(e) => return Err(e),
        };

        let result = self
            .tool
            .run(&sessions.endpoints(), self.timeout, cancel)
            .await;
        sessions.close().await;
        result
    }
}

/// Both inspectors, configured from one [`Config`]
pub struct InspectorSet {
    pub virt: Inspector<VirtInspector>,
    pub v2v: Inspector<VirtV2vInspector>,
}

impl InspectorSet {
    /// Build both inspectors; they share only the durable store and
    /// credentials
    pub async fn from_config(config: &Config, credentials: Credentials) -> InspectResult<Self> {
        let store = match config.store_dir() {
            Some(dir) => Some(Arc::new(FileStore::open(dir).await?)),
            None => None,
        };
        let timeout = Duration::from_secs(config.inspector.timeout_secs);
        // One exporter, so a fixed-port exporter's lock covers both tools
        let exporter = exporter(config);

        let virt = Inspector::new(
            VirtInspector::new(&config.inspector.virt_inspector_path),
            orchestrator(config, Arc::clone(&exporter)),
            credentials.clone(),
            timeout,
            store
                .clone()
                .map(|s| s as Arc<dyn DurableStore<VirtInspectorReport>>),
        );
        let v2v = Inspector::new(
            VirtV2vInspector::new(&config.inspector.virt_v2v_inspector_path),
            orchestrator(config, exporter),
            credentials,
            timeout,
            store.map(|s| s as Arc<dyn DurableStore<V2vInspectorReport>>),
        );

        Ok(Self { virt, v2v })
    }
}

/// Disk exporter for the configured session mode
pub fn exporter(config: &Config) -> Arc<dyn DiskExporter> {
    let session = &config.session;
    match session.mode {
        SessionMode::PerDisk => Arc::new(
            NbdkitExporter::new(&session.nbdkit_path)
                .with_libdir(session.vddk_libdir.clone())
                .with_thumbprint(session.thumbprint.clone()),
        ),
        SessionMode::Shared => Arc::new(V2vOpenExporter::new(
            &session.v2v_open_path,
            session.v2v_open_port,
        )),
    }
}

/// Session orchestrator for the configured mode
pub fn orchestrator(config: &Config, exporter: Arc<dyn DiskExporter>) -> Orchestrator {
    let session = &config.session;
    Orchestrator::new(
        session.mode,
        exporter,
        Duration::from_secs(session.ready_timeout_secs),
        Duration::from_millis(session.grace_period_ms),
    )
}
