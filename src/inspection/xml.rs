//! XML documents emitted by the libguestfs inspection tools
//!
//! The raw structs mirror the tool output and are converted into the report
//! types, which carry their own serialized names for the durable store.

use crate::error::{InspectError, InspectResult};
use crate::inspection::report::{
    Application, Drive, Filesystem, Mountpoint, OperatingSystem, V2vInspectorReport,
    V2vOperatingSystem, VirtInspectorReport,
};
use serde::Deserialize;

/// Parse `<operatingsystems>` as printed by virt-inspector
pub fn parse_virt_inspector(xml: &str) -> InspectResult<VirtInspectorReport> {
    let raw: RawOperatingSystems = quick_xml::de::from_str(xml).map_err(|e| InspectError::Parse {
        tool: "virt-inspector".to_string(),
        reason: format!("XML parsing error: {}", e),
    })?;

    if raw.operating_systems.is_empty() {
        return Err(InspectError::Parse {
            tool: "virt-inspector".to_string(),
            reason: "no operating systems found in inspection output".to_string(),
        });
    }

    Ok(VirtInspectorReport {
        operating_systems: raw.operating_systems.into_iter().map(Into::into).collect(),
    })
}

/// Parse `<v2v-inspection>` as printed by virt-v2v-inspector
pub fn parse_v2v_inspector(xml: &str) -> InspectResult<V2vInspectorReport> {
    let raw: RawV2vInspection = quick_xml::de::from_str(xml).map_err(|e| InspectError::Parse {
        tool: "virt-v2v-inspector".to_string(),
        reason: format!("XML parsing error: {}", e),
    })?;

    let os = raw.operating_system.ok_or_else(|| InspectError::Parse {
        tool: "virt-v2v-inspector".to_string(),
        reason: "no operating system found in inspection output".to_string(),
    })?;

    Ok(V2vInspectorReport {
        operating_system: os.into(),
    })
}

#[derive(Debug, Deserialize)]
struct RawOperatingSystems {
    #[serde(rename = "operatingsystem", default)]
    operating_systems: Vec<RawOperatingSystem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOperatingSystem {
    name: String,
    distro: String,
    major_version: String,
    minor_version: String,
    arch: String,
    hostname: String,
    product_name: String,
    root: String,
    package_format: String,
    package_management: String,
    osinfo: String,
    applications: RawApplications,
    filesystems: RawFilesystems,
    mountpoints: RawMountpoints,
    drives: RawDrives,
}

#[derive(Debug, Default, Deserialize)]
struct RawApplications {
    #[serde(rename = "application", default)]
    items: Vec<RawApplication>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawApplication {
    name: String,
    version: String,
    epoch: String,
    release: String,
    arch: String,
    url: String,
    summary: String,
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawFilesystems {
    #[serde(rename = "filesystem", default)]
    items: Vec<RawFilesystem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFilesystem {
    #[serde(rename = "@dev")]
    dev: String,
    #[serde(rename = "type")]
    fs_type: String,
    uuid: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawMountpoints {
    #[serde(rename = "mountpoint", default)]
    items: Vec<RawMountpoint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMountpoint {
    #[serde(rename = "@dev")]
    dev: String,
    #[serde(rename = "$text")]
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawDrives {
    #[serde(rename = "drive", default)]
    items: Vec<RawDrive>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDrive {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawV2vInspection {
    #[serde(rename = "operatingsystem")]
    operating_system: Option<RawV2vOperatingSystem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawV2vOperatingSystem {
    name: String,
    distro: String,
    osinfo: String,
    arch: String,
    major_version: String,
    minor_version: String,
    product_name: String,
    product_variant: String,
    root: String,
    package_format: String,
    package_management: String,
    mountpoints: RawMountpoints,
}

impl From<RawMountpoint> for Mountpoint {
    fn from(raw: RawMountpoint) -> Self {
        Self {
            device: raw.dev,
            mount_point: raw.path.trim().to_string(),
        }
    }
}

impl From<RawOperatingSystem> for OperatingSystem {
    fn from(raw: RawOperatingSystem) -> Self {
        Self {
            name: raw.name,
            distro: raw.distro,
            major_version: raw.major_version,
            minor_version: raw.minor_version,
            architecture: raw.arch,
            hostname: raw.hostname,
            product: raw.product_name,
            root: raw.root,
            package_format: raw.package_format,
            package_management: raw.package_management,
            osinfo: raw.osinfo,
            applications: raw
                .applications
                .items
                .into_iter()
                .map(|a| Application {
                    name: a.name,
                    version: a.version,
                    epoch: a.epoch.trim().parse().unwrap_or(0),
                    release: a.release,
                    arch: a.arch,
                    url: a.url,
                    summary: a.summary,
                    description: a.description,
                })
                .collect(),
            filesystems: raw
                .filesystems
                .items
                .into_iter()
                .map(|f| Filesystem {
                    device: f.dev,
                    fs_type: f.fs_type,
                    uuid: f.uuid,
                })
                .collect(),
            mountpoints: raw.mountpoints.items.into_iter().map(Into::into).collect(),
            drives: raw
                .drives
                .items
                .into_iter()
                .map(|d| Drive { name: d.name })
                .collect(),
        }
    }
}

impl From<RawV2vOperatingSystem> for V2vOperatingSystem {
    fn from(raw: RawV2vOperatingSystem) -> Self {
        Self {
            name: raw.name,
            distro: raw.distro,
            osinfo: raw.osinfo,
            architecture: raw.arch,
            major_version: raw.major_version,
            minor_version: raw.minor_version,
            product: raw.product_name,
            product_variant: raw.product_variant,
            root: raw.root,
            package_format: raw.package_format,
            package_management: raw.package_management,
            mountpoints: raw.mountpoints.items.into_iter().map(Into::into).collect(),
        }
    }
}
