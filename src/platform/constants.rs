/// Platform-specific constants for mount operations

#[cfg(target_os = "linux")]
pub mod linux {
    /// Path to check for active mounts
    pub const PROC_MOUNTS: &str = "/proc/mounts";
}

#[cfg(not(target_os = "linux"))]
pub mod bsd {
    /// Mount command for listing mounts
    pub const MOUNT_CMD: &str = "mount";
}

/// Common constants across platforms
pub mod common {
    use std::time::Duration;

    /// Filesystem types the kernel CIFS client reports for SMB mounts.
    pub const CIFS_FSTYPES: &[&str] = &["cifs", "smb3"];

    /// Filesystem type reported for BSD-style smbfs mounts.
    pub const SMBFS_FSTYPES: &[&str] = &["smbfs"];

    /// Mount utility for the kernel CIFS client
    pub const MOUNT_CIFS: &str = "mount.cifs";

    /// Mount utility for BSD-style smbfs
    pub const MOUNT_SMBFS: &str = "mount_smbfs";

    /// Unmount utility
    pub const UMOUNT: &str = "umount";

    /// Sentinel login recorded when the mount options carry no username.
    pub const GUEST_LOGIN: &str = "guest";

    /// Default workgroup when none can be parsed from mount options.
    pub const DEFAULT_WORKGROUP: &str = "WORKGROUP";

    /// Timeout for a single privileged mount invocation
    pub const MOUNT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Timeout for unmount operations
    pub const UNMOUNT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Bound on waiting for outstanding jobs at shutdown
    pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(15);

    /// Bound on waiting for a foreground mount/unmount command to finish.
    /// One job may invoke the helper twice (credential or share-name
    /// retry) and sit out a Wake-on-LAN settle first, so this must exceed
    /// two helper timeouts.
    pub const FOREGROUND_JOIN_TIMEOUT: Duration = Duration::from_secs(180);

    /// UDP port Wake-on-LAN packets are sent to
    pub const WOL_PORT: u16 = 9;
}
