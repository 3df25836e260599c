//! Per-disk sessions via nbdkit's VDDK plugin

use crate::error::{InspectError, InspectResult};
use crate::session::credentials::password_file;
use crate::session::{ConnectionContext, DiskDescriptor, DiskExporter, LaunchSpec, NbdEndpoint};
use std::net::TcpListener;
use std::path::PathBuf;

/// Address nbdkit listens on
const BIND_HOST: &str = "127.0.0.1";

/// Exposes one snapshot base disk per process, read-only
#[derive(Debug, Clone)]
pub struct NbdkitExporter {
    program: PathBuf,
    libdir: Option<PathBuf>,
    thumbprint: Option<String>,
}

impl NbdkitExporter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            libdir: None,
            thumbprint: None,
        }
    }

    /// VDDK library directory, passed as `libdir=`
    pub fn with_libdir(mut self, libdir: Option<PathBuf>) -> Self {
        self.libdir = libdir;
        self
    }

    /// Server certificate SHA1 thumbprint, passed as `thumbprint=`
    pub fn with_thumbprint(mut self, thumbprint: Option<String>) -> Self {
        self.thumbprint = thumbprint;
        self
    }

    fn args(
        &self,
        port: u16,
        conn: &ConnectionContext,
        password_path: &str,
        vm_moref: &str,
        snapshot_moref: &str,
        path: &str,
    ) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "-r".to_string(),
            "-i".to_string(),
            BIND_HOST.to_string(),
            "--port".to_string(),
            port.to_string(),
            "vddk".to_string(),
            format!("server={}", conn.host),
            format!("user={}", conn.username),
            format!("password=+{}", password_path),
            format!("vm=moref={}", vm_moref),
            format!("snapshot={}", snapshot_moref),
            format!("file={}", path),
        ];
        if let Some(thumbprint) = &self.thumbprint {
            args.push(format!("thumbprint={}", thumbprint));
        }
        if let Some(libdir) = &self.libdir {
            args.push(format!("libdir={}", libdir.display()));
        }
        args
    }
}

impl DiskExporter for NbdkitExporter {
    fn name(&self) -> &str {
        "nbdkit"
    }

    fn prepare(&self, disk: &DiskDescriptor, conn: &ConnectionContext) -> InspectResult<LaunchSpec> {
        let DiskDescriptor::Disk {
            vm_moref,
            snapshot_moref,
            path,
        } = disk
        else {
            return Err(InspectError::InvalidTarget(
                "nbdkit sessions expose a single disk, not a whole VM".to_string(),
            ));
        };

        if vm_moref.is_empty() || snapshot_moref.is_empty() {
            return Err(InspectError::MissingValue(
                "VM and snapshot managed object references".to_string(),
            ));
        }
        if path.is_empty() {
            return Err(InspectError::MissingValue("base disk path".to_string()));
        }

        let port = free_port()?;
        let password = password_file(&conn.password)?;
        let args = self.args(
            port,
            conn,
            &password.display().to_string(),
            vm_moref,
            snapshot_moref,
            path,
        );

        Ok(LaunchSpec {
            program: self.program.clone(),
            args,
            env: vec![],
            endpoint: NbdEndpoint::new(BIND_HOST, port),
            artifacts: vec![password],
        })
    }
}

/// Ask the kernel for an unused local port
fn free_port() -> InspectResult<u16> {
    let listener = TcpListener::bind((BIND_HOST, 0))
        .map_err(|e| InspectError::io("allocating NBD port", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| InspectError::io("allocating NBD port", e))?
        .port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionContext {
        ConnectionContext {
            host: "vcenter.example.com".to_string(),
            username: "admin".to_string(),
            password: "s3cret".to_string(),
        }
    }

    fn disk() -> DiskDescriptor {
        DiskDescriptor::Disk {
            vm_moref: "vm-42".to_string(),
            snapshot_moref: "snapshot-7".to_string(),
            path: "[datastore1] vm1/vm1.vmdk".to_string(),
        }
    }

    #[test]
    fn prepares_vddk_command() {
        let exporter = NbdkitExporter::new("nbdkit")
            .with_libdir(Some(PathBuf::from("/opt/vddk")))
            .with_thumbprint(Some("AA:BB".to_string()));
        let spec = exporter.prepare(&disk(), &conn()).unwrap();

        assert_eq!(spec.program, PathBuf::from("nbdkit"));
        assert_eq!(spec.endpoint.host, "127.0.0.1");
        assert!(spec.args.contains(&"vddk".to_string()));
        assert!(spec.args.contains(&"server=vcenter.example.com".to_string()));
        assert!(spec.args.contains(&"vm=moref=vm-42".to_string()));
        assert!(spec.args.contains(&"snapshot=snapshot-7".to_string()));
        assert!(spec.args.contains(&"file=[datastore1] vm1/vm1.vmdk".to_string()));
        assert!(spec.args.contains(&"libdir=/opt/vddk".to_string()));
        assert!(spec.args.contains(&"thumbprint=AA:BB".to_string()));
        assert!(spec.args.contains(&spec.endpoint.port.to_string()));
    }

    #[test]
    fn password_stays_off_command_line() {
        let spec = NbdkitExporter::new("nbdkit").prepare(&disk(), &conn()).unwrap();

        assert!(spec.args.iter().all(|a| !a.contains("s3cret")));
        assert_eq!(spec.artifacts.len(), 1);
        let stored = std::fs::read_to_string(&spec.artifacts[0]).unwrap();
        assert_eq!(stored, "s3cret");
    }

    #[test]
    fn rejects_whole_vm_descriptor() {
        let vm = DiskDescriptor::Vm {
            name: "vm1".to_string(),
            snapshot: "snap1".to_string(),
            datacenter: "dc1".to_string(),
        };
        let err = NbdkitExporter::new("nbdkit").prepare(&vm, &conn()).err().unwrap();
        assert!(matches!(err, InspectError::InvalidTarget(_)));
    }

    #[test]
    fn rejects_empty_disk_path() {
        let disk = DiskDescriptor::Disk {
            vm_moref: "vm-42".to_string(),
            snapshot_moref: "snapshot-7".to_string(),
            path: String::new(),
        };
        let err = NbdkitExporter::new("nbdkit").prepare(&disk, &conn()).err().unwrap();
        assert!(matches!(err, InspectError::MissingValue(_)));
    }
}
