//! Parsed inspection results

use serde::{Deserialize, Serialize};

/// Output of virt-inspector: every operating system found on the disks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtInspectorReport {
    pub operating_systems: Vec<OperatingSystem>,
}

impl VirtInspectorReport {
    /// All mountpoints across all operating systems
    pub fn mountpoints(&self) -> impl Iterator<Item = &Mountpoint> {
        self.operating_systems.iter().flat_map(|os| os.mountpoints.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatingSystem {
    pub name: String,
    pub distro: String,
    pub major_version: String,
    pub minor_version: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub product: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package_format: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package_management: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub osinfo: String,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub filesystems: Vec<Filesystem>,
    #[serde(default)]
    pub mountpoints: Vec<Mountpoint>,
    #[serde(default)]
    pub drives: Vec<Drive>,
}

/// An installed package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Application {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub epoch: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub release: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub arch: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filesystem {
    pub device: String,
    #[serde(rename = "type")]
    pub fs_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
}

/// A guest fstab entry: device and where it is mounted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mountpoint {
    pub device: String,
    pub mount_point: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Drive {
    pub name: String,
}

/// Output of virt-v2v-inspector: the one operating system a conversion
/// would target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct V2vInspectorReport {
    pub operating_system: V2vOperatingSystem,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct V2vOperatingSystem {
    pub name: String,
    pub distro: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub osinfo: String,
    pub architecture: String,
    pub major_version: String,
    pub minor_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub product: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub product_variant: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package_format: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package_management: String,
    #[serde(default)]
    pub mountpoints: Vec<Mountpoint>,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}
