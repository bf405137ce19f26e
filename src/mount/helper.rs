use crate::error::{Result, SharekeeperError};
use crate::platform::common::{MOUNT_CIFS, MOUNT_SMBFS, MOUNT_TIMEOUT, UMOUNT, UNMOUNT_TIMEOUT};
use crate::platform::{Platform, PlatformInfo};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Cooperative cancellation signal for one job. The sender flips the value
/// to true exactly once; a job may consult it across several helper
/// invocations (retries), which is why this is a watch and not a oneshot.
pub type CancelSignal = watch::Receiver<bool>;

/// Resolves when the signal fires; pends forever if the sender is dropped
/// without cancelling.
pub async fn wait_cancelled(mut cancel: CancelSignal) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Outcome of one privileged helper invocation.
#[derive(Debug, Clone)]
pub struct HelperOutput {
    /// Exit code, if the process ran to completion.
    pub status: Option<i32>,
    pub stderr: String,
    /// True when the invocation was cancelled before completion. The
    /// helper may still have taken effect; reconciliation picks that up.
    pub cancelled: bool,
}

impl HelperOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0) && !self.cancelled
    }
}

/// Classification of a failed mount by inspecting the helper's error text.
///
/// The wrapped mount utility has no structured error channel, so substring
/// matching is inherent to this boundary and reproduced faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountFailureKind {
    /// Wrong or missing credentials; triggers a one-shot interactive retry.
    Authentication,
    /// Host unreachable or timed out; eligible for policy-driven retry.
    Unreachable,
    /// Server rejected the share name; legacy servers expose shares with
    /// spaces where clients send underscores.
    BadShareName,
    Other,
}

pub fn classify_mount_failure(stderr: &str) -> MountFailureKind {
    let text = stderr.to_lowercase();

    const AUTH: &[&str] = &[
        "permission denied",
        "access denied",
        "logon failure",
        "status_logon_failure",
        "status_access_denied",
        "status_wrong_password",
    ];
    const UNREACHABLE: &[&str] = &[
        "could not resolve address",
        "unable to find suitable address",
        "connection timed out",
        "timed out",
        "no route to host",
        "network is unreachable",
        "host is down",
        "connection refused",
        "status_io_timeout",
        "status_host_unreachable",
    ];
    const BAD_SHARE_NAME: &[&str] = &[
        "bad network name",
        "status_bad_network_name",
        "no such device or address",
    ];

    if AUTH.iter().any(|s| text.contains(s)) {
        MountFailureKind::Authentication
    } else if UNREACHABLE.iter().any(|s| text.contains(s)) {
        MountFailureKind::Unreachable
    } else if BAD_SHARE_NAME.iter().any(|s| text.contains(s)) {
        MountFailureKind::BadShareName
    } else {
        MountFailureKind::Other
    }
}

/// Boundary to the privileged helper process that invokes the OS mount and
/// unmount utilities. Implementations receive a fully-built option string
/// and report a status code plus free-text error output.
#[async_trait]
pub trait MountHelper: Send + Sync {
    /// Invoke the mount utility. The password, if any, travels out of band
    /// (environment), never in the option string.
    async fn mount(
        &self,
        source: &str,
        mount_point: &Path,
        options: &str,
        password: Option<&str>,
        cancel: CancelSignal,
    ) -> Result<HelperOutput>;

    /// Invoke the unmount utility. `lazy` requests a lazy/forced detach.
    async fn unmount(
        &self,
        mount_point: &Path,
        lazy: bool,
        cancel: CancelSignal,
    ) -> Result<HelperOutput>;

    /// Verify the helper's tools are present before batch operations.
    fn check_health(&self) -> Result<()>;
}

enum HelperFlavor {
    /// mount.cifs: `mount.cifs <source> <target> -o <options>`
    Cifs,
    /// mount_smbfs: `mount_smbfs <flags...> <source> <target>`
    Smbfs,
}

/// Real helper implementation wrapping the platform mount utilities via
/// `tokio::process`.
pub struct ProcessMountHelper {
    mount_tool: PathBuf,
    umount_tool: PathBuf,
    flavor: HelperFlavor,
}

impl ProcessMountHelper {
    async fn run_tool(
        &self,
        program: &Path,
        args: &[String],
        password: Option<&str>,
        limit: std::time::Duration,
        cancel: CancelSignal,
    ) -> Result<HelperOutput> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(password) = password {
            // mount.cifs and mount_smbfs both read PASSWD from the
            // environment, keeping the secret out of the argument list
            cmd.env("PASSWD", password);
        }

        debug!("Running helper: {} {}", program.display(), args.join(" "));

        let child = cmd.spawn()?;
        let wait = child.wait_with_output();
        tokio::pin!(wait);

        tokio::select! {
            output = timeout(limit, &mut wait) => {
                let output = output.map_err(|_| SharekeeperError::CommandTimeout {
                    command: program.display().to_string(),
                    timeout_secs: limit.as_secs(),
                })??;
                Ok(HelperOutput {
                    status: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    cancelled: false,
                })
            }
            _ = wait_cancelled(cancel) => {
                // Dropping the wait future kills the child (kill_on_drop);
                // the utility may already be past the point of no return,
                // in which case reconciliation observes the result later.
                warn!("Helper invocation cancelled: {}", program.display());
                Ok(HelperOutput {
                    status: None,
                    stderr: String::new(),
                    cancelled: true,
                })
            }
        }
    }
}

#[async_trait]
impl MountHelper for ProcessMountHelper {
    async fn mount(
        &self,
        source: &str,
        mount_point: &Path,
        options: &str,
        password: Option<&str>,
        cancel: CancelSignal,
    ) -> Result<HelperOutput> {
        let args = match self.flavor {
            HelperFlavor::Cifs => vec![
                source.to_string(),
                mount_point.display().to_string(),
                "-o".to_string(),
                options.to_string(),
            ],
            HelperFlavor::Smbfs => {
                let mut args: Vec<String> =
                    options.split_whitespace().map(|s| s.to_string()).collect();
                args.push(source.to_string());
                args.push(mount_point.display().to_string());
                args
            }
        };

        self.run_tool(&self.mount_tool, &args, password, MOUNT_TIMEOUT, cancel)
            .await
    }

    async fn unmount(
        &self,
        mount_point: &Path,
        lazy: bool,
        cancel: CancelSignal,
    ) -> Result<HelperOutput> {
        let mut args = Vec::new();
        if lazy {
            args.push("-l".to_string());
        }
        args.push(mount_point.display().to_string());

        self.run_tool(&self.umount_tool, &args, None, UNMOUNT_TIMEOUT, cancel)
            .await
    }

    fn check_health(&self) -> Result<()> {
        if !self.mount_tool.exists() {
            return Err(SharekeeperError::ToolNotFound {
                tool: self.mount_tool.display().to_string(),
            });
        }
        if !self.umount_tool.exists() {
            return Err(SharekeeperError::ToolNotFound {
                tool: self.umount_tool.display().to_string(),
            });
        }
        Ok(())
    }
}

/// Factory for the helper matching the detected platform.
pub fn get_mount_helper(platform_info: &PlatformInfo) -> Result<ProcessMountHelper> {
    match &platform_info.platform {
        Platform::Linux(info) => {
            let mount_tool =
                info.mount_cifs_path
                    .clone()
                    .ok_or_else(|| SharekeeperError::ToolNotFound {
                        tool: MOUNT_CIFS.to_string(),
                    })?;
            if !info.has_umount {
                return Err(SharekeeperError::ToolNotFound {
                    tool: UMOUNT.to_string(),
                });
            }
            Ok(ProcessMountHelper {
                mount_tool,
                umount_tool: which::which(UMOUNT).map_err(|_| {
                    SharekeeperError::ToolNotFound {
                        tool: UMOUNT.to_string(),
                    }
                })?,
                flavor: HelperFlavor::Cifs,
            })
        }
        Platform::Bsd(info) => {
            let mount_tool =
                info.mount_smbfs_path
                    .clone()
                    .ok_or_else(|| SharekeeperError::ToolNotFound {
                        tool: MOUNT_SMBFS.to_string(),
                    })?;
            Ok(ProcessMountHelper {
                mount_tool,
                umount_tool: which::which(UMOUNT).map_err(|_| {
                    SharekeeperError::ToolNotFound {
                        tool: UMOUNT.to_string(),
                    }
                })?,
                flavor: HelperFlavor::Smbfs,
            })
        }
        Platform::Unsupported(os) => Err(SharekeeperError::PlatformNotSupported {
            platform: os.clone(),
        }),
    }
}
