//! Ephemeral credential files handed to exporter processes
//!
//! Passwords are never put on a command line or in a URL. Each session gets
//! its own owner-only temporary file, deleted when the session closes.

use crate::error::{InspectError, InspectResult};
use std::io::Write;
use tempfile::TempPath;

/// Write a bare password file, as read by nbdkit's `password=+FILE`
pub fn password_file(password: &str) -> InspectResult<TempPath> {
    write_private("vmprobe-pass-", ".txt", password)
}

/// Write a libvirt `auth.conf` with credentials for an ESX/vCenter host.
///
/// See <https://libvirt.org/auth.html#client-configuration>.
pub fn libvirt_auth_file(host: &str, username: &str, password: &str) -> InspectResult<TempPath> {
    let content = format!(
        "[credentials-vcenter]\nusername={}\npassword={}\n\n[auth-esx-{}]\ncredentials=vcenter\n",
        username, password, host
    );
    write_private("libvirt-auth-", ".conf", &content)
}

fn write_private(prefix: &str, suffix: &str, content: &str) -> InspectResult<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
        .map_err(|e| InspectError::io("creating credential file", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        file.as_file()
            .set_permissions(perms)
            .map_err(|e| InspectError::io("setting credential file permissions", e))?;
    }

    file.write_all(content.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| InspectError::io("writing credential file", e))?;

    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn libvirt_auth_layout() {
        let path = libvirt_auth_file("vcenter.example.com", "admin", "s3cret").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();

        assert!(content.contains("[credentials-vcenter]\nusername=admin\npassword=s3cret\n"));
        assert!(content.contains("[auth-esx-vcenter.example.com]\ncredentials=vcenter"));
    }

    #[test]
    fn password_file_removed_on_close() {
        let path = password_file("s3cret").unwrap();
        let location = path.to_path_buf();
        assert_eq!(std::fs::read_to_string(&location).unwrap(), "s3cret");

        path.close().unwrap();
        assert!(!location.exists());
    }

    #[cfg(unix)]
    #[test]
    fn files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let path = password_file("s3cret").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
