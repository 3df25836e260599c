//! Whole-VM sessions via virt-v2v-open

use crate::error::{InspectError, InspectResult};
use crate::session::credentials::libvirt_auth_file;
use crate::session::{ConnectionContext, DiskDescriptor, DiskExporter, LaunchSpec, NbdEndpoint};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Port virt-v2v-open serves on when not told otherwise
pub const DEFAULT_V2V_OPEN_PORT: u16 = 10809;

/// Exposes every disk of a VM snapshot through one virt-v2v-open process.
///
/// The port is fixed, so clones share one lock and only one session set
/// serves on it at a time.
#[derive(Debug, Clone)]
pub struct V2vOpenExporter {
    program: PathBuf,
    port: u16,
    lock: Arc<Semaphore>,
}

impl V2vOpenExporter {
    pub fn new(program: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            program: program.into(),
            port,
            lock: Arc::new(Semaphore::new(1)),
        }
    }
}

/// Errors when something already listens on `port`
fn ensure_port_free(port: u16) -> std::io::Result<()> {
    TcpListener::bind(("127.0.0.1", port)).map(drop)
}

impl DiskExporter for V2vOpenExporter {
    fn name(&self) -> &str {
        "virt-v2v-open"
    }

    fn prepare(&self, disk: &DiskDescriptor, conn: &ConnectionContext) -> InspectResult<LaunchSpec> {
        let DiskDescriptor::Vm {
            name,
            snapshot,
            datacenter,
        } = disk
        else {
            return Err(InspectError::InvalidTarget(
                "virt-v2v-open sessions expose a whole VM, not a single disk".to_string(),
            ));
        };

        if datacenter.is_empty() {
            return Err(InspectError::MissingValue("datacenter".to_string()));
        }

        // Readiness only probes the port, so a foreign server there would
        // pass for ours
        ensure_port_free(self.port).map_err(|e| InspectError::session_start(self.name(), e))?;

        // Credentials go through LIBVIRT_AUTH_FILE, never the vpx:// URL
        let auth = libvirt_auth_file(&conn.host, &conn.username, &conn.password)?;
        let snapshot: String = url::form_urlencoded::byte_serialize(snapshot.as_bytes()).collect();
        let source = format!(
            "vpx://{}/{}/{}?snapshot={}&no_verify=1",
            conn.host, datacenter, name, snapshot
        );

        Ok(LaunchSpec {
            program: self.program.clone(),
            args: vec![
                "-it".to_string(),
                "vddk".to_string(),
                source,
                "-o".to_string(),
                "nbd".to_string(),
            ],
            env: vec![("LIBVIRT_AUTH_FILE".to_string(), auth.display().to_string())],
            endpoint: NbdEndpoint::new("localhost", self.port),
            artifacts: vec![auth],
        })
    }

    fn exclusive(&self) -> Option<Arc<Semaphore>> {
        Some(Arc::clone(&self.lock))
    }
}
