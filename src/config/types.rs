use crate::share::FilesystemKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tri-state for a single configurable field.
///
/// `Default` and `Unset` both fall through during resolution, but only
/// `Explicit` counts as a user-made choice. Collapsing the two (the
/// classic "compare against a default sentinel" trick) cannot tell
/// "explicitly set to the default value" apart from "never set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setting<T> {
    Unset,
    Default,
    Explicit(T),
}

impl<T> Setting<T> {
    pub fn is_explicit(&self) -> bool {
        matches!(self, Setting::Explicit(_))
    }

    pub fn explicit(&self) -> Option<&T> {
        match self {
            Setting::Explicit(v) => Some(v),
            _ => None,
        }
    }

    /// Resolution step: an explicit value wins, anything else falls
    /// through to the next layer.
    pub fn or_else_layer<'a>(&'a self, lower: &'a Setting<T>) -> &'a Setting<T> {
        if self.is_explicit() { self } else { lower }
    }
}

impl<T> Default for Setting<T> {
    fn default() -> Self {
        Setting::Unset
    }
}

/// `sec=` mount option values understood by mount.cifs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    None,
    Krb5,
    Krb5i,
    Ntlm,
    Ntlmi,
    Ntlmv2,
    Ntlmv2i,
    Ntlmssp,
    Ntlmsspi,
}

impl SecurityMode {
    pub fn as_option_value(&self) -> &'static str {
        match self {
            SecurityMode::None => "none",
            SecurityMode::Krb5 => "krb5",
            SecurityMode::Krb5i => "krb5i",
            SecurityMode::Ntlm => "ntlm",
            SecurityMode::Ntlmi => "ntlmi",
            SecurityMode::Ntlmv2 => "ntlmv2",
            SecurityMode::Ntlmv2i => "ntlmv2i",
            SecurityMode::Ntlmssp => "ntlmssp",
            SecurityMode::Ntlmsspi => "ntlmsspi",
        }
    }
}

impl std::str::FromStr for SecurityMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SecurityMode::None),
            "krb5" => Ok(SecurityMode::Krb5),
            "krb5i" => Ok(SecurityMode::Krb5i),
            "ntlm" => Ok(SecurityMode::Ntlm),
            "ntlmi" => Ok(SecurityMode::Ntlmi),
            "ntlmv2" => Ok(SecurityMode::Ntlmv2),
            "ntlmv2i" => Ok(SecurityMode::Ntlmv2i),
            "ntlmssp" => Ok(SecurityMode::Ntlmssp),
            "ntlmsspi" => Ok(SecurityMode::Ntlmsspi),
            _ => Err(anyhow::anyhow!("Invalid security mode: {}", s)),
        }
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_option_value())
    }
}

/// `vers=` mount option values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmbProtocolVersion {
    OnePointZero,
    TwoPointZero,
    TwoPointOne,
    ThreePointZero,
    ThreePointOneOne,
    /// Let the kernel negotiate.
    Negotiate,
}

impl SmbProtocolVersion {
    pub fn as_option_value(&self) -> &'static str {
        match self {
            SmbProtocolVersion::OnePointZero => "1.0",
            SmbProtocolVersion::TwoPointZero => "2.0",
            SmbProtocolVersion::TwoPointOne => "2.1",
            SmbProtocolVersion::ThreePointZero => "3.0",
            SmbProtocolVersion::ThreePointOneOne => "3.1.1",
            SmbProtocolVersion::Negotiate => "default",
        }
    }
}

impl std::str::FromStr for SmbProtocolVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1.0" => Ok(SmbProtocolVersion::OnePointZero),
            "2.0" => Ok(SmbProtocolVersion::TwoPointZero),
            "2.1" => Ok(SmbProtocolVersion::TwoPointOne),
            "3.0" => Ok(SmbProtocolVersion::ThreePointZero),
            "3.1.1" => Ok(SmbProtocolVersion::ThreePointOneOne),
            "default" | "negotiate" => Ok(SmbProtocolVersion::Negotiate),
            _ => Err(anyhow::anyhow!("Invalid SMB protocol version: {}", s)),
        }
    }
}

impl std::fmt::Display for SmbProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_option_value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAccess {
    ReadWrite,
    ReadOnly,
}

impl std::str::FromStr for WriteAccess {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rw" | "read_write" | "read-write" => Ok(WriteAccess::ReadWrite),
            "ro" | "read_only" | "read-only" => Ok(WriteAccess::ReadOnly),
            _ => Err(anyhow::anyhow!(
                "Invalid write access: {}. Must be 'rw' or 'ro'",
                s
            )),
        }
    }
}

impl std::fmt::Display for WriteAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteAccess::ReadWrite => write!(f, "rw"),
            WriteAccess::ReadOnly => write!(f, "ro"),
        }
    }
}

/// Remount behavior after reconnects, profile switches and startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemountFlag {
    None,
    /// Remount a single time, then clear back to `None`.
    Once,
    /// Remount on every trigger until explicitly cleared.
    Always,
}

impl Default for RemountFlag {
    fn default() -> Self {
        RemountFlag::None
    }
}

/// Key for a custom-settings record. A record with `share == None` applies
/// to the whole host; a share-level record shadows it field by field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettingsKey {
    pub workgroup: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,
}

impl SettingsKey {
    pub fn for_host(workgroup: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            workgroup: workgroup.into(),
            host: host.into(),
            share: None,
        }
    }

    pub fn for_share(
        workgroup: impl Into<String>,
        host: impl Into<String>,
        share: impl Into<String>,
    ) -> Self {
        Self {
            workgroup: workgroup.into(),
            host: host.into(),
            share: Some(share.into()),
        }
    }

    pub fn is_host_level(&self) -> bool {
        self.share.is_none()
    }

    /// Host-level key covering this one.
    pub fn host_key(&self) -> SettingsKey {
        SettingsKey::for_host(self.workgroup.clone(), self.host.clone())
    }
}

/// User overrides for one host or one share. Every field is tri-state; the
/// resolver applies share > host > global precedence per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomSettings {
    #[serde(default)]
    pub port: Setting<u16>,
    #[serde(default)]
    pub security_mode: Setting<SecurityMode>,
    #[serde(default)]
    pub write_access: Setting<WriteAccess>,
    #[serde(default)]
    pub protocol_version: Setting<SmbProtocolVersion>,
    #[serde(default)]
    pub uid: Setting<u32>,
    #[serde(default)]
    pub gid: Setting<u32>,
    #[serde(default)]
    pub fs_kind: Setting<FilesystemKind>,

    /// Wake-on-LAN MAC address, `aa:bb:cc:dd:ee:ff`.
    #[serde(default)]
    pub wol_mac_address: Setting<String>,
    #[serde(default)]
    pub wol_send_before_mount: Setting<bool>,
    #[serde(default)]
    pub wol_send_before_scan: Setting<bool>,

    #[serde(default)]
    pub remount: RemountFlag,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

impl CustomSettings {
    /// True iff the user actually changed something. Relies on the
    /// tri-state: a field explicitly set to the default value still counts.
    pub fn has_custom_settings(&self) -> bool {
        self.port.is_explicit()
            || self.security_mode.is_explicit()
            || self.write_access.is_explicit()
            || self.protocol_version.is_explicit()
            || self.uid.is_explicit()
            || self.gid.is_explicit()
            || self.fs_kind.is_explicit()
            || self.wol_mac_address.is_explicit()
            || self.wol_send_before_mount.is_explicit()
            || self.wol_send_before_scan.is_explicit()
            || self.remount != RemountFlag::None
    }
}

/// Global defaults every unresolved field falls back to. Loaded by an
/// external collaborator; consumed read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_security_mode")]
    pub security_mode: SecurityMode,
    #[serde(default = "default_write_access")]
    pub write_access: WriteAccess,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: SmbProtocolVersion,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub gid: Option<u32>,
    #[serde(default)]
    pub fs_kind: FilesystemKind,

    /// Directory under which mount points are created, e.g. `~/smb`.
    #[serde(default = "default_mount_prefix")]
    pub mount_prefix: PathBuf,

    /// Whether foreign mounts are retained in the registry at all.
    #[serde(default = "default_detect_all_shares")]
    pub detect_all_shares: bool,

    /// Remount attempts per share before the policy gives up and notifies.
    #[serde(default = "default_remount_retry_ceiling")]
    pub remount_retry_ceiling: u32,

    /// Seconds to wait after a Wake-on-LAN packet before mounting.
    #[serde(default = "default_wol_settle_secs")]
    pub wol_settle_secs: u64,

    /// Reconciliation tick interval.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            security_mode: default_security_mode(),
            write_access: default_write_access(),
            protocol_version: default_protocol_version(),
            uid: None,
            gid: None,
            fs_kind: FilesystemKind::default(),
            mount_prefix: default_mount_prefix(),
            detect_all_shares: default_detect_all_shares(),
            remount_retry_ceiling: default_remount_retry_ceiling(),
            wol_settle_secs: default_wol_settle_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

fn default_port() -> u16 {
    445
}

fn default_security_mode() -> SecurityMode {
    SecurityMode::Ntlmssp
}

fn default_write_access() -> WriteAccess {
    WriteAccess::ReadWrite
}

fn default_protocol_version() -> SmbProtocolVersion {
    SmbProtocolVersion::Negotiate
}

fn default_mount_prefix() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("smb")
}

fn default_detect_all_shares() -> bool {
    true
}

fn default_remount_retry_ceiling() -> u32 {
    5
}

fn default_wol_settle_secs() -> u64 {
    5
}

fn default_reconcile_interval_secs() -> u64 {
    15
}
