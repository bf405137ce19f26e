use super::events::OperationKind;
use super::helper::{MountFailureKind, MountHelper, classify_mount_failure};
use super::jobs::{JobKey, JobOutcome, JobResult};
use super::option_string::OptionStringBuilder;
use super::wol;
use crate::credentials::CredentialProvider;
use crate::error::{Result, SharekeeperError};
use crate::options::EffectiveOptions;
use crate::share::ShareId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// A spawned helper task plus its cancellation handle.
pub struct SpawnedJob {
    pub cancel: watch::Sender<bool>,
    pub handle: tokio::task::JoinHandle<()>,
}

/// Builds and submits one privileged mount or unmount operation. Results
/// are reported asynchronously through the outcome channel; the executor
/// never blocks its caller on helper completion.
pub struct MountExecutor {
    helper: Arc<dyn MountHelper>,
    builder: Arc<dyn OptionStringBuilder>,
    credentials: Arc<dyn CredentialProvider>,
    outcomes: mpsc::UnboundedSender<JobOutcome>,
}

impl MountExecutor {
    pub fn new(
        helper: Arc<dyn MountHelper>,
        builder: Arc<dyn OptionStringBuilder>,
        credentials: Arc<dyn CredentialProvider>,
        outcomes: mpsc::UnboundedSender<JobOutcome>,
    ) -> Self {
        Self {
            helper,
            builder,
            credentials,
            outcomes,
        }
    }

    pub fn check_health(&self) -> Result<()> {
        self.helper.check_health()
    }

    /// Preconditions checked before any privileged call.
    pub fn validate_mount(&self, share: &ShareId) -> Result<()> {
        if share.host.is_empty() || share.share.is_empty() {
            return Err(SharekeeperError::InvalidShareId {
                message: format!("incomplete identity: {share}"),
            });
        }
        if share.is_homes_share() && share.login.is_none() {
            return Err(SharekeeperError::MissingLoginName {
                host: share.host.clone(),
                share: share.share.clone(),
            });
        }
        Ok(())
    }

    /// Spawn the mount task for an already-reserved job key.
    pub fn spawn_mount(
        &self,
        key: JobKey,
        share: ShareId,
        options: EffectiveOptions,
    ) -> SpawnedJob {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let helper = Arc::clone(&self.helper);
        let builder = Arc::clone(&self.builder);
        let credentials = Arc::clone(&self.credentials);
        let outcomes = self.outcomes.clone();
        let mount_point = key.mount_point().to_path_buf();

        let handle = tokio::spawn(async move {
            let result = run_mount_job(
                helper.as_ref(),
                builder.as_ref(),
                credentials,
                &share,
                &mount_point,
                options,
                cancel_rx,
            )
            .await;

            let _ = outcomes.send(JobOutcome {
                key,
                share,
                kind: OperationKind::Mount,
                result,
            });
        });

        SpawnedJob {
            cancel: cancel_tx,
            handle,
        }
    }

    /// Spawn the unmount task for an already-reserved job key. Foreign
    /// ownership is checked by the caller before the key is reserved.
    pub fn spawn_unmount(&self, key: JobKey, share: ShareId, force: bool) -> SpawnedJob {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let helper = Arc::clone(&self.helper);
        let outcomes = self.outcomes.clone();
        let mount_point = key.mount_point().to_path_buf();

        let handle = tokio::spawn(async move {
            let result = match helper.unmount(&mount_point, force, cancel_rx).await {
                Ok(output) if output.cancelled => JobResult::Cancelled,
                Ok(output) if output.success() => {
                    cleanup_mount_point(&mount_point);
                    JobResult::Success
                }
                Ok(output) => JobResult::Failed(SharekeeperError::MountOperationFailed {
                    message: format!("umount failed: {}", output.stderr.trim()),
                }),
                Err(e) => JobResult::Failed(e),
            };

            let _ = outcomes.send(JobOutcome {
                key,
                share,
                kind: OperationKind::Unmount,
                result,
            });
        });

        SpawnedJob {
            cancel: cancel_tx,
            handle,
        }
    }
}

async fn run_mount_job(
    helper: &dyn MountHelper,
    builder: &dyn OptionStringBuilder,
    credentials: Arc<dyn CredentialProvider>,
    share: &ShareId,
    mount_point: &Path,
    options: EffectiveOptions,
    cancel: watch::Receiver<bool>,
) -> JobResult {
    // Optional pre-mount wake-up; the settle wait blocks only this job
    if let Some(wol) = &options.wol
        && wol.send_before_mount
    {
        match wol::send_magic_packet(&wol.mac_address).await {
            Ok(()) => {
                debug!("Waiting {:?} for {} to wake", wol.settle, share.host);
                tokio::time::sleep(wol.settle).await;
            }
            Err(e) => warn!("Wake-on-LAN for {} failed: {}", share.host, e),
        }
    }

    let created = match create_mount_point_tree(mount_point) {
        Ok(created) => created,
        Err(e) => return JobResult::Failed(e),
    };

    let result = attempt_mount(helper, builder, credentials, share, mount_point, options, cancel)
        .await;

    // On failure or cancellation, remove the directories we created back
    // up to the first ancestor that already existed
    if !matches!(result, JobResult::Success)
        && let Some(created) = created
    {
        rollback_mount_point(&created, mount_point);
    }

    result
}

async fn attempt_mount(
    helper: &dyn MountHelper,
    builder: &dyn OptionStringBuilder,
    credentials: Arc<dyn CredentialProvider>,
    share: &ShareId,
    mount_point: &Path,
    options: EffectiveOptions,
    cancel: watch::Receiver<bool>,
) -> JobResult {
    let mut attempt_share = share.clone();
    let mut options = options;
    let mut password: Option<String> = None;
    let mut auth_retried = false;
    let mut name_retried = false;

    loop {
        let source = builder.source(&attempt_share, &options);
        let option_string = builder.build(&attempt_share, &options);

        let output = match helper
            .mount(
                &source,
                mount_point,
                &option_string,
                password.as_deref(),
                cancel.clone(),
            )
            .await
        {
            Ok(output) => output,
            Err(e) => return JobResult::Failed(e),
        };

        if output.cancelled {
            return JobResult::Cancelled;
        }
        if output.success() {
            info!("Mounted {} at {}", attempt_share, mount_point.display());
            return JobResult::Success;
        }

        let stderr = output.stderr.trim().to_string();
        match classify_mount_failure(&stderr) {
            MountFailureKind::Authentication if !auth_retried => {
                auth_retried = true;
                // The prompt may block on a human; keep it off the runtime
                let provider = Arc::clone(&credentials);
                let identity = share.clone();
                let supplied = tokio::task::spawn_blocking(move || {
                    provider.get_credentials(&identity)
                })
                .await
                .ok()
                .flatten();

                match supplied {
                    Some(creds) => {
                        info!("Retrying {} with fresh credentials", share);
                        options.username = Some(creds.username);
                        password = Some(creds.password);
                    }
                    None => {
                        return JobResult::Failed(SharekeeperError::AuthenticationFailed {
                            host: share.host.clone(),
                            share: share.share.clone(),
                        });
                    }
                }
            }
            MountFailureKind::Authentication => {
                return JobResult::Failed(SharekeeperError::AuthenticationFailed {
                    host: share.host.clone(),
                    share: share.share.clone(),
                });
            }
            MountFailureKind::BadShareName
                if !name_retried && attempt_share.share.contains('_') =>
            {
                // Legacy servers export shares with spaces where clients
                // send underscores
                name_retried = true;
                attempt_share.share = attempt_share.share.replace('_', " ");
                debug!("Retrying with share name {:?}", attempt_share.share);
            }
            MountFailureKind::Unreachable => {
                return JobResult::Failed(SharekeeperError::HostUnreachable {
                    host: share.host.clone(),
                });
            }
            MountFailureKind::BadShareName | MountFailureKind::Other => {
                return JobResult::Failed(SharekeeperError::MountOperationFailed {
                    message: stderr,
                });
            }
        }
    }
}

/// Create the mount-point directory tree, each new component inheriting
/// the permissions of the nearest pre-existing ancestor. Returns the
/// topmost directory that had to be created, for rollback.
fn create_mount_point_tree(path: &Path) -> Result<Option<PathBuf>> {
    if path.exists() {
        if !path.is_dir() {
            return Err(SharekeeperError::MountOperationFailed {
                message: format!("{} exists but is not a directory", path.display()),
            });
        }
        return Ok(None);
    }

    let mut existing = path;
    while !existing.exists() {
        existing = existing
            .parent()
            .ok_or_else(|| SharekeeperError::MountOperationFailed {
                message: format!("no existing ancestor for {}", path.display()),
            })?;
    }

    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(existing)?.permissions().mode() & 0o7777
    };

    let rel = path
        .strip_prefix(existing)
        .expect("path is a descendant of its ancestor");
    let mut current = existing.to_path_buf();
    let mut first_created = None;

    for component in rel.components() {
        current.push(component);
        if current.exists() {
            continue;
        }
        std::fs::create_dir(&current)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&current, std::fs::Permissions::from_mode(mode))?;
        }
        if first_created.is_none() {
            debug!("Created mount point tree from {}", current.display());
            first_created = Some(current.clone());
        }
    }

    Ok(first_created)
}

/// Remove the directories created for this job, deepest first. Only empty
/// directories are removed: a cancelled helper can still have produced a
/// live mount, and a non-empty directory stops the walk.
fn rollback_mount_point(first_created: &Path, mount_point: &Path) {
    let mut current = mount_point;
    while current.starts_with(first_created) {
        if let Err(e) = std::fs::remove_dir(current) {
            warn!("Leaving mount point tree {}: {}", current.display(), e);
            return;
        }
        if current == first_created {
            return;
        }
        let Some(parent) = current.parent() else {
            return;
        };
        current = parent;
    }
}

/// Remove the now-empty mount point directory after a successful unmount.
fn cleanup_mount_point(path: &Path) {
    if !path.is_dir() {
        return;
    }
    match std::fs::read_dir(path) {
        Ok(mut entries) => {
            if entries.next().is_none()
                && let Err(e) = std::fs::remove_dir(path)
            {
                warn!("Failed to remove mount point {}: {}", path.display(), e);
            }
        }
        Err(_) => {}
    }
}
