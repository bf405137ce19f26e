use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// The (workgroup, host, share) triple identifying a remote resource,
/// independent of any particular text serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShareId {
    pub workgroup: String,
    pub host: String,
    pub share: String,

    /// Login bound to this share. Required before a homes share can be
    /// mounted; optional everywhere else.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
}

impl ShareId {
    pub fn new(
        workgroup: impl Into<String>,
        host: impl Into<String>,
        share: impl Into<String>,
    ) -> Self {
        Self {
            workgroup: workgroup.into(),
            host: host.into(),
            share: share.into(),
            login: None,
        }
    }

    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    /// Per-user share template on the server; needs a concrete login bound
    /// before it resolves to something mountable.
    pub fn is_homes_share(&self) -> bool {
        self.share.eq_ignore_ascii_case("homes")
    }

    /// UNC form as passed to the mount utility, e.g. `//server/data`.
    pub fn unc(&self) -> String {
        format!("//{}/{}", self.host, self.share)
    }
}

impl std::fmt::Display for ShareId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.unc())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId {
    pub workgroup: String,
    pub host: String,
}

/// A browseable network item. Hosts and shares share a few derived
/// properties but carry different fields, so this is a sum type rather
/// than a class hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NetworkItem {
    Host(HostId),
    Share(ShareId),
}

impl NetworkItem {
    pub fn workgroup(&self) -> &str {
        match self {
            NetworkItem::Host(h) => &h.workgroup,
            NetworkItem::Share(s) => &s.workgroup,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            NetworkItem::Host(h) => &h.host,
            NetworkItem::Share(s) => &s.host,
        }
    }

    /// Canonical `smb://` path for display and settings lookup.
    pub fn canonical_path(&self) -> String {
        match self {
            NetworkItem::Host(h) => format!("smb://{}/{}", h.workgroup, h.host),
            NetworkItem::Share(s) => {
                format!("smb://{}/{}/{}", s.workgroup, s.host, s.share)
            }
        }
    }
}

/// Mount state of a share as this process sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
    /// Present in the mount table but the mount point cannot be traversed
    /// (stale handle, dead server, permissions).
    Inaccessible,
}

impl Default for MountState {
    fn default() -> Self {
        MountState::Unmounted
    }
}

/// Filesystem used for the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesystemKind {
    /// Linux kernel CIFS client (covers SMB1 through SMB3).
    Cifs,
    /// BSD-style smbfs.
    Smbfs,
}

impl Default for FilesystemKind {
    fn default() -> Self {
        FilesystemKind::Cifs
    }
}

impl std::fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilesystemKind::Cifs => write!(f, "cifs"),
            FilesystemKind::Smbfs => write!(f, "smbfs"),
        }
    }
}

/// Uid/gid that performed a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOwnership {
    pub uid: u32,
    pub gid: u32,
}

/// Best-effort usage statistics, refreshed on reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// In-memory representation of a discoverable/mountable network share and
/// its runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareRecord {
    pub id: ShareId,

    /// Resolved network address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_addr: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    pub state: MountState,
    pub fs_kind: FilesystemKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<MountOwnership>,

    /// True when the mount was not created by this user/process.
    pub foreign: bool,

    #[serde(default)]
    pub usage: DiskUsage,
}

impl ShareRecord {
    pub fn new(id: ShareId) -> Self {
        Self {
            id,
            host_addr: None,
            port: None,
            state: MountState::Unmounted,
            fs_kind: FilesystemKind::default(),
            mount_point: None,
            owner: None,
            foreign: false,
            usage: DiskUsage::default(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        matches!(self.state, MountState::Mounted | MountState::Inaccessible)
    }

    /// A mount satisfies a remount request only if it is ours.
    pub fn satisfies_remount(&self) -> bool {
        self.is_mounted() && !self.foreign
    }

    pub fn clear_mount_fields(&mut self) {
        self.state = MountState::Unmounted;
        self.mount_point = None;
        self.owner = None;
        self.foreign = false;
        self.usage = DiskUsage::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_id_unc() {
        let id = ShareId::new("WORKGROUP", "server", "data");
        assert_eq!(id.unc(), "//server/data");
        assert_eq!(id.to_string(), "//server/data");
    }

    #[test]
    fn test_homes_share_detection() {
        let homes = ShareId::new("WORKGROUP", "server", "HOMES");
        assert!(homes.is_homes_share());
        assert!(homes.login.is_none());

        let bound = homes.with_login("alice");
        assert_eq!(bound.login.as_deref(), Some("alice"));

        let plain = ShareId::new("WORKGROUP", "server", "data");
        assert!(!plain.is_homes_share());
    }

    #[test]
    fn test_network_item_canonical_path() {
        let host = NetworkItem::Host(HostId {
            workgroup: "WORKGROUP".to_string(),
            host: "server".to_string(),
        });
        assert_eq!(host.canonical_path(), "smb://WORKGROUP/server");

        let share = NetworkItem::Share(ShareId::new("WORKGROUP", "server", "data"));
        assert_eq!(share.canonical_path(), "smb://WORKGROUP/server/data");
        assert_eq!(share.host(), "server");
    }

    #[test]
    fn test_record_satisfies_remount() {
        let mut record = ShareRecord::new(ShareId::new("WG", "server", "data"));
        assert!(!record.satisfies_remount());

        record.state = MountState::Mounted;
        assert!(record.satisfies_remount());

        record.foreign = true;
        assert!(!record.satisfies_remount());
    }

    #[test]
    fn test_record_serialization() {
        let record = ShareRecord::new(ShareId::new("WG", "server", "data"));
        let json = serde_json::to_string(&record).unwrap();
        let parsed: ShareRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.state, MountState::Unmounted);
    }
}
