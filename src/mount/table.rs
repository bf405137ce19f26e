use crate::error::Result;
use crate::platform::common::{CIFS_FSTYPES, DEFAULT_WORKGROUP, GUEST_LOGIN, SMBFS_FSTYPES};
use crate::share::{DiskUsage, FilesystemKind, MountOwnership, ShareId};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One SMB mount observed in the OS mount table.
#[derive(Debug, Clone)]
pub struct ObservedMount {
    pub mount_point: PathBuf,
    pub fs_kind: FilesystemKind,
    pub host: String,
    pub share: String,
    pub workgroup: String,
    pub addr: Option<IpAddr>,
    /// Login parsed from the mount options, "guest" when absent.
    pub login: String,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl ObservedMount {
    pub fn share_id(&self) -> ShareId {
        ShareId::new(self.workgroup.clone(), self.host.clone(), self.share.clone())
            .with_login(self.login.clone())
    }
}

/// Result of the out-of-band existence/ownership probe against a mount
/// point.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    pub accessible: bool,
    pub owner: MountOwnership,
    pub usage: DiskUsage,
}

/// /proc/mounts escapes space, tab, newline and backslash as octal.
/// Decoding works on raw bytes: multi-byte UTF-8 sequences in share and
/// mount point names must pass through untouched.
fn decode_octal_escapes(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let oct = &bytes[i + 1..i + 4];
            if oct.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let code = ((oct[0] - b'0') as u32) << 6
                    | ((oct[1] - b'0') as u32) << 3
                    | (oct[2] - b'0') as u32;
                out.push(code as u8);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_device(device: &str) -> Option<(String, String)> {
    let normalized = device.replace('\\', "/");
    let trimmed = normalized.trim_start_matches('/');
    let mut parts = trimmed.splitn(2, '/');
    let host = parts.next()?.to_string();
    let share = parts.next()?.trim_end_matches('/').to_string();
    if host.is_empty() || share.is_empty() {
        return None;
    }
    // mount_smbfs style //user@host/share
    let host = host
        .rsplit_once('@')
        .map(|(_, h)| h.to_string())
        .unwrap_or(host);
    Some((host, share))
}

fn fs_kind_for(fs_type: &str) -> Option<FilesystemKind> {
    if CIFS_FSTYPES.contains(&fs_type) {
        Some(FilesystemKind::Cifs)
    } else if SMBFS_FSTYPES.contains(&fs_type) {
        Some(FilesystemKind::Smbfs)
    } else {
        None
    }
}

/// Parse mount-table text in /proc/mounts format, keeping only entries
/// whose filesystem type is a supported remote SMB kind.
pub fn parse_mount_table(content: &str) -> Vec<ObservedMount> {
    let mut observed = Vec::new();

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }

        let Some(fs_kind) = fs_kind_for(fields[2]) else {
            continue;
        };

        let device = decode_octal_escapes(fields[0]);
        let Some((host, share)) = parse_device(&device) else {
            continue;
        };
        let mount_point = PathBuf::from(decode_octal_escapes(fields[1]));

        let mut workgroup = DEFAULT_WORKGROUP.to_string();
        let mut addr = None;
        let mut login: Option<String> = None;
        let mut uid = None;
        let mut gid = None;

        // Device strings can carry the login too (//user@host/share)
        if let Some((user, _)) = device.trim_start_matches('/').split_once('@')
            && !user.is_empty()
        {
            login = Some(user.to_string());
        }

        for option in fields[3].split(',') {
            let (key, value) = match option.split_once('=') {
                Some(kv) => kv,
                None => continue,
            };
            match key {
                "addr" => addr = value.parse().ok(),
                "username" | "user" => {
                    if !value.is_empty() {
                        login = Some(value.to_string());
                    }
                }
                "domain" | "dom" => workgroup = value.to_string(),
                "uid" => uid = value.parse().ok(),
                "gid" => gid = value.parse().ok(),
                _ => {}
            }
        }

        observed.push(ObservedMount {
            mount_point,
            fs_kind,
            host,
            share,
            workgroup,
            addr,
            login: login.unwrap_or_else(|| GUEST_LOGIN.to_string()),
            uid,
            gid,
        });
    }

    observed
}

/// Enumerate the OS's current SMB mounts.
#[cfg(target_os = "linux")]
pub async fn read_mount_table() -> Result<Vec<ObservedMount>> {
    use crate::platform::linux::PROC_MOUNTS;

    let content = tokio::fs::read_to_string(PROC_MOUNTS).await?;
    let observed = parse_mount_table(&content);
    debug!("Observed {} SMB mounts", observed.len());
    Ok(observed)
}

#[cfg(not(target_os = "linux"))]
pub async fn read_mount_table() -> Result<Vec<ObservedMount>> {
    use crate::platform::bsd::MOUNT_CMD;

    // `mount -p` prints fstab-format lines, close enough to /proc/mounts
    let output = tokio::process::Command::new(MOUNT_CMD)
        .arg("-p")
        .output()
        .await?;
    let content = String::from_utf8_lossy(&output.stdout);
    let observed = parse_mount_table(&content);
    debug!("Observed {} SMB mounts", observed.len());
    Ok(observed)
}

/// Existence/ownership/usage probe against a local mount path. Runs on the
/// blocking pool so a dead server cannot stall the control loop.
pub async fn probe_mount_point(path: &Path) -> ProbeResult {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || probe_sync(&path))
        .await
        .unwrap_or_else(|_| inaccessible_result())
}

fn current_owner() -> MountOwnership {
    #[cfg(unix)]
    {
        MountOwnership {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
    #[cfg(not(unix))]
    {
        MountOwnership { uid: 0, gid: 0 }
    }
}

fn inaccessible_result() -> ProbeResult {
    // Ownership falls back to the current process identity
    ProbeResult {
        accessible: false,
        owner: current_owner(),
        usage: DiskUsage::default(),
    }
}

#[cfg(unix)]
fn probe_sync(path: &Path) -> ProbeResult {
    use nix::sys::statvfs::statvfs;
    use nix::unistd::{AccessFlags, access};
    use std::os::unix::fs::MetadataExt;

    let Ok(metadata) = std::fs::metadata(path) else {
        return inaccessible_result();
    };
    if !metadata.is_dir() {
        return inaccessible_result();
    }
    if access(path, AccessFlags::X_OK).is_err() {
        return inaccessible_result();
    }

    let usage = match statvfs(path) {
        Ok(stat) => {
            let frsize = stat.fragment_size() as u64;
            let total = stat.blocks() as u64 * frsize;
            let free = stat.blocks_available() as u64 * frsize;
            let used = total.saturating_sub(stat.blocks_free() as u64 * frsize);
            DiskUsage {
                free_bytes: free,
                used_bytes: used,
                total_bytes: total,
            }
        }
        Err(_) => DiskUsage::default(),
    };

    ProbeResult {
        accessible: true,
        owner: MountOwnership {
            uid: metadata.uid(),
            gid: metadata.gid(),
        },
        usage,
    }
}

#[cfg(not(unix))]
fn probe_sync(path: &Path) -> ProbeResult {
    if path.is_dir() {
        ProbeResult {
            accessible: true,
            owner: current_owner(),
            usage: DiskUsage::default(),
        }
    } else {
        inaccessible_result()
    }
}
