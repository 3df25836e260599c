//! Fan-out of sessions over all disks of a snapshot

use crate::error::{InspectError, InspectResult};
use crate::session::{
    ConnectionContext, DiskDescriptor, DiskExporter, NbdEndpoint, SessionHandle, SessionMode,
    SnapshotDiskInfo,
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Opens and rolls back groups of sessions for one inspection attempt
pub struct Orchestrator {
    mode: SessionMode,
    exporter: Arc<dyn DiskExporter>,
    ready_timeout: Duration,
    grace_period: Duration,
}

impl Orchestrator {
    pub fn new(
        mode: SessionMode,
        exporter: Arc<dyn DiskExporter>,
        ready_timeout: Duration,
        grace_period: Duration,
    ) -> Self {
        Self {
            mode,
            exporter,
            ready_timeout,
            grace_period,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Session descriptors for a snapshot under the configured strategy
    pub fn descriptors(
        &self,
        vm_name: &str,
        snapshot_name: &str,
        datacenter: &str,
        disks: &SnapshotDiskInfo,
    ) -> InspectResult<Vec<DiskDescriptor>> {
        match self.mode {
            SessionMode::PerDisk => {
                if disks.base_disk_paths.is_empty() {
                    return Err(InspectError::MissingValue("snapshot base disk paths".to_string()));
                }
                Ok(disks
                    .base_disk_paths
                    .iter()
                    .map(|path| DiskDescriptor::Disk {
                        vm_moref: disks.vm_moref.clone(),
                        snapshot_moref: disks.snapshot_moref.clone(),
                        path: path.clone(),
                    })
                    .collect())
            }
            SessionMode::Shared => Ok(vec![DiskDescriptor::Vm {
                name: vm_name.to_string(),
                snapshot: snapshot_name.to_string(),
                datacenter: datacenter.to_string(),
            }]),
        }
    }

    /// Open one ready session per descriptor, in order.
    ///
    /// On the first failure every session opened so far, including the
    /// failing one, is closed and the error is tagged with the disk index.
    pub async fn open_all(
        &self,
        disks: &[DiskDescriptor],
        conn: &ConnectionContext,
        cancel: &CancellationToken,
    ) -> InspectResult<SessionSet> {
        if disks.is_empty() {
            return Err(InspectError::MissingValue("disk descriptors".to_string()));
        }

        let mut set = SessionSet::default();
        if let Some(lock) = self.exporter.exclusive() {
            set.permit = Some(self.exclusive_access(lock, cancel).await?);
        }
        for (index, disk) in disks.iter().enumerate() {
            debug!(disk_index = index, ?disk, "Starting {} session", self.exporter.name());

            if let Err(e) = self.open_one(disk, conn, cancel, &mut set).await {
                error!(disk_index = index, error = %e, "Session setup failed, closing {} open sessions", set.len());
                set.close().await;
                return Err(e.on_disk(index));
            }
        }

        info!(
            mode = %self.mode,
            disk_count = set.len(),
            "All {} sessions ready",
            self.exporter.name()
        );
        Ok(set)
    }

    async fn exclusive_access(
        &self,
        lock: Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> InspectResult<OwnedSemaphorePermit> {
        if lock.available_permits() == 0 {
            debug!("Waiting for the running {} session set to close", self.exporter.name());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(InspectError::Cancelled),
            permit = lock.acquire_owned() => permit.map_err(|_| {
                InspectError::Internal(format!("{} session lock closed", self.exporter.name()))
            }),
        }
    }

    async fn open_one(
        &self,
        disk: &DiskDescriptor,
        conn: &ConnectionContext,
        cancel: &CancellationToken,
        set: &mut SessionSet,
    ) -> InspectResult<()> {
        let spec = self.exporter.prepare(disk, conn)?;
        let handle = SessionHandle::open(spec, self.grace_period, cancel)?;
        // Owned by the set before the readiness wait so a failure still closes it
        let handle = set.push(handle);
        handle.wait_ready(self.ready_timeout, cancel).await
    }
}

/// Sessions backing one inspection, closed together.
///
/// Holds the exporter's exclusive permit, if any, until the set is gone.
#[derive(Default)]
pub struct SessionSet {
    sessions: Vec<SessionHandle>,
    permit: Option<OwnedSemaphorePermit>,
}

impl SessionSet {
    fn push(&mut self, handle: SessionHandle) -> &mut SessionHandle {
        self.sessions.push(handle);
        let last = self.sessions.len() - 1;
        &mut self.sessions[last]
    }

    /// Endpoints in disk order
    pub fn endpoints(&self) -> Vec<NbdEndpoint> {
        self.sessions.iter().map(|s| s.endpoint().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session, then release the permit. Individual failures
    /// are logged by the handles.
    pub async fn close(mut self) {
        join_all(self.sessions.iter_mut().map(|s| s.close())).await;
        self.permit.take();
    }
}
