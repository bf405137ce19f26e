use crate::error::Result;
use crate::platform::common::{MOUNT_CIFS, MOUNT_SMBFS, UMOUNT};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum Platform {
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    Linux(LinuxInfo),
    #[cfg_attr(target_os = "linux", allow(dead_code))]
    Bsd(BsdInfo),
    #[allow(dead_code)] // Needed for exhaustive matching but only constructed elsewhere
    Unsupported(String),
}

/// Tooling available for the kernel CIFS client.
#[derive(Debug, Clone, PartialEq)]
pub struct LinuxInfo {
    pub has_mount_cifs: bool,
    pub mount_cifs_path: Option<PathBuf>,
    pub has_umount: bool,
}

/// Tooling available for BSD-style smbfs.
#[derive(Debug, Clone, PartialEq)]
pub struct BsdInfo {
    pub os: String,
    pub has_mount_smbfs: bool,
    pub mount_smbfs_path: Option<PathBuf>,
    pub has_umount: bool,
}

#[derive(Debug, Clone)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub can_mount: bool,
    pub missing_tools: Vec<String>,
}

impl Platform {
    pub fn mount_tool_name(&self) -> Option<&'static str> {
        match self {
            Platform::Linux(_) => Some(MOUNT_CIFS),
            Platform::Bsd(_) => Some(MOUNT_SMBFS),
            Platform::Unsupported(_) => None,
        }
    }
}

pub fn detect_platform() -> Result<PlatformInfo> {
    debug!("Starting platform detection");

    #[cfg(target_os = "linux")]
    {
        detect_linux()
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "macos"
    ))]
    {
        detect_bsd()
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "macos"
    )))]
    {
        let os = std::env::consts::OS;
        Ok(PlatformInfo {
            platform: Platform::Unsupported(os.to_string()),
            can_mount: false,
            missing_tools: vec![],
        })
    }
}

#[cfg(target_os = "linux")]
fn detect_linux() -> Result<PlatformInfo> {
    // mount.cifs normally lives in /sbin, which is not always on PATH
    let mount_cifs_path = which::which(MOUNT_CIFS)
        .or_else(|_| which::which(format!("/sbin/{MOUNT_CIFS}")))
        .or_else(|_| which::which(format!("/usr/sbin/{MOUNT_CIFS}")))
        .ok();
    let has_mount_cifs = mount_cifs_path.is_some();
    if has_mount_cifs {
        info!("Found {MOUNT_CIFS} at {:?}", mount_cifs_path);
    } else {
        info!("{MOUNT_CIFS} not found");
    }

    let has_umount = which::which(UMOUNT).is_ok();

    let mut missing_tools = Vec::new();
    if !has_mount_cifs {
        missing_tools.push(MOUNT_CIFS.to_string());
    }
    if !has_umount {
        missing_tools.push(UMOUNT.to_string());
    }

    Ok(PlatformInfo {
        can_mount: has_mount_cifs && has_umount,
        platform: Platform::Linux(LinuxInfo {
            has_mount_cifs,
            mount_cifs_path,
            has_umount,
        }),
        missing_tools,
    })
}

#[cfg(any(
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "macos"
))]
fn detect_bsd() -> Result<PlatformInfo> {
    let mount_smbfs_path = which::which(MOUNT_SMBFS).ok();
    let has_mount_smbfs = mount_smbfs_path.is_some();
    if has_mount_smbfs {
        info!("Found {MOUNT_SMBFS} at {:?}", mount_smbfs_path);
    } else {
        info!("{MOUNT_SMBFS} not found");
    }

    let has_umount = which::which(UMOUNT).is_ok();

    let mut missing_tools = Vec::new();
    if !has_mount_smbfs {
        missing_tools.push(MOUNT_SMBFS.to_string());
    }
    if !has_umount {
        missing_tools.push(UMOUNT.to_string());
    }

    Ok(PlatformInfo {
        can_mount: has_mount_smbfs && has_umount,
        platform: Platform::Bsd(BsdInfo {
            os: std::env::consts::OS.to_string(),
            has_mount_smbfs,
            mount_smbfs_path,
            has_umount,
        }),
        missing_tools,
    })
}
