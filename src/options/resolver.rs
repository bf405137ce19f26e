use crate::config::{
    CustomSettings, GlobalSettings, SecurityMode, Setting, SmbProtocolVersion, WriteAccess,
};
use crate::share::{FilesystemKind, MountOwnership, ShareId};
use std::path::PathBuf;
use std::time::Duration;

/// Wake-on-LAN parameters resolved for one mount attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WolParams {
    pub mac_address: String,
    pub send_before_mount: bool,
    pub send_before_scan: bool,
    pub settle: Duration,
}

/// The fully resolved configuration for one mount attempt, after applying
/// the override precedence chain. Never mutated after construction;
/// recomputed on every attempt because custom settings may have changed
/// in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveOptions {
    pub port: u16,
    pub security_mode: SecurityMode,
    pub write_access: WriteAccess,
    pub protocol_version: SmbProtocolVersion,
    pub uid: u32,
    pub gid: u32,
    pub fs_kind: FilesystemKind,
    pub workgroup: String,
    pub username: Option<String>,
    pub mount_prefix: PathBuf,
    pub wol: Option<WolParams>,
}

impl EffectiveOptions {
    /// Mount point for a share under the resolved prefix.
    pub fn mount_point_for(&self, share: &ShareId) -> PathBuf {
        self.mount_prefix
            .join(share.host.to_lowercase())
            .join(share.share.to_lowercase())
    }
}

/// Merge global defaults, host-level overrides and share-level overrides
/// into an effective configuration for one share.
///
/// For every field the precedence is: explicit share-level > explicit
/// host-level > global default. `Unset` and `Default` both fall through.
/// Resolution is pure and never fails; absent records behave like records
/// with every field unset.
pub fn resolve(
    share: &ShareId,
    host_settings: Option<&CustomSettings>,
    share_settings: Option<&CustomSettings>,
    global: &GlobalSettings,
    process_owner: MountOwnership,
) -> EffectiveOptions {
    let empty = CustomSettings::default();
    let host = host_settings.unwrap_or(&empty);
    let per_share = share_settings.unwrap_or(&empty);

    fn pick<T: Clone>(share_layer: &Setting<T>, host_layer: &Setting<T>, global: T) -> T {
        share_layer
            .or_else_layer(host_layer)
            .explicit()
            .cloned()
            .unwrap_or(global)
    }

    let wol_mac = pick(&per_share.wol_mac_address, &host.wol_mac_address, String::new());
    let wol = if wol_mac.is_empty() {
        None
    } else {
        Some(WolParams {
            mac_address: wol_mac,
            send_before_mount: pick(
                &per_share.wol_send_before_mount,
                &host.wol_send_before_mount,
                false,
            ),
            send_before_scan: pick(
                &per_share.wol_send_before_scan,
                &host.wol_send_before_scan,
                false,
            ),
            settle: Duration::from_secs(global.wol_settle_secs),
        })
    };

    EffectiveOptions {
        port: pick(&per_share.port, &host.port, global.port),
        security_mode: pick(
            &per_share.security_mode,
            &host.security_mode,
            global.security_mode,
        ),
        write_access: pick(
            &per_share.write_access,
            &host.write_access,
            global.write_access,
        ),
        protocol_version: pick(
            &per_share.protocol_version,
            &host.protocol_version,
            global.protocol_version,
        ),
        uid: pick(&per_share.uid, &host.uid, global.uid.unwrap_or(process_owner.uid)),
        gid: pick(&per_share.gid, &host.gid, global.gid.unwrap_or(process_owner.gid)),
        fs_kind: pick(&per_share.fs_kind, &host.fs_kind, global.fs_kind),
        workgroup: share.workgroup.clone(),
        username: share.login.clone(),
        mount_prefix: global.mount_prefix.clone(),
        wol,
    }
}
