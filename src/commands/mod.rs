pub mod mount;
pub mod remount;
pub mod status;
pub mod unmount;
pub mod watch;

use anyhow::{Context, Result, bail};
use sharekeeper::config::{JsonSettingsStore, load_global_settings};
use sharekeeper::credentials::{CredentialProvider, Credentials, StaticCredentials};
use sharekeeper::mount::{MountOrchestrator, get_mount_helper, option_builder_for};
use sharekeeper::platform::detect_platform;
use sharekeeper::share::ShareId;
use std::sync::Arc;

/// Parse a share given as `//host/share`, `host/share` or
/// `smb://workgroup/host/share`.
pub fn parse_share(
    arg: &str,
    workgroup: Option<&str>,
    login: Option<&str>,
) -> Result<ShareId> {
    let (mut workgroup, rest) = match arg.strip_prefix("smb://") {
        Some(rest) => {
            let (wg, rest) = rest
                .split_once('/')
                .with_context(|| format!("Invalid share path: {arg}"))?;
            (Some(wg.to_string()), rest)
        }
        None => (
            workgroup.map(|s| s.to_string()),
            arg.trim_start_matches('/'),
        ),
    };
    if workgroup.is_none() {
        workgroup = Some("WORKGROUP".to_string());
    }

    let Some((host, share)) = rest.split_once('/') else {
        bail!("Invalid share path: {arg} (expected //host/share)");
    };
    let share = share.trim_end_matches('/');
    if host.is_empty() || share.is_empty() || share.contains('/') {
        bail!("Invalid share path: {arg} (expected //host/share)");
    }

    let mut id = ShareId::new(workgroup.unwrap(), host, share);
    if let Some(login) = login {
        id = id.with_login(login);
    }
    Ok(id)
}

/// Wire up the orchestrator against the real platform helper and the
/// on-disk settings store.
pub fn build_orchestrator(
    username: Option<String>,
    password: Option<String>,
) -> Result<MountOrchestrator> {
    let platform_info = detect_platform()?;
    if !platform_info.can_mount {
        bail!(
            "Cannot mount on this system; missing tools: {}",
            platform_info.missing_tools.join(", ")
        );
    }

    let helper = Arc::new(get_mount_helper(&platform_info)?);
    let builder: Arc<dyn sharekeeper::mount::OptionStringBuilder> =
        Arc::from(option_builder_for(&platform_info));
    let credentials: Arc<dyn CredentialProvider> = Arc::new(StaticCredentials::new(
        match (username, password) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        },
    ));

    let global = load_global_settings()?;
    let store = Box::new(JsonSettingsStore::new()?);

    Ok(MountOrchestrator::new(
        global, store, helper, builder, credentials,
    ))
}

/// One-line human rendering of a lifecycle event.
pub fn print_event(event: &sharekeeper::mount::ShareEvent) {
    use colored::*;
    use sharekeeper::mount::ShareEvent;

    match event {
        ShareEvent::AboutToStart { share, kind } => {
            println!("{} {} of {}", "Starting".cyan(), kind, share);
        }
        ShareEvent::Finished { .. } => {}
        ShareEvent::Mounted { share, mount_point } => {
            println!(
                "{} {} at {}",
                "Mounted".green().bold(),
                share,
                mount_point.display()
            );
        }
        ShareEvent::Unmounted { share, mount_point } => {
            println!(
                "{} {} from {}",
                "Unmounted".green(),
                share,
                mount_point.display()
            );
        }
        ShareEvent::MountFailed { share, reason } => {
            println!("{} to mount {}: {}", "Failed".red().bold(), share, reason);
        }
        ShareEvent::UnmountFailed { share, reason } => {
            println!("{} to unmount {}: {}", "Failed".red().bold(), share, reason);
        }
        ShareEvent::RemountExhausted { share, attempts } => {
            println!(
                "{} remounting {} after {} attempts",
                "Gave up".yellow().bold(),
                share,
                attempts
            );
        }
    }
}
