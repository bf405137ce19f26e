use anyhow::{Result, bail};
use colored::*;
use sharekeeper::mount::ShareEvent;
use sharekeeper::platform::common::FOREGROUND_JOIN_TIMEOUT;

pub async fn execute(
    share: Option<String>,
    all: bool,
    workgroup: Option<String>,
    login: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let mut orchestrator = super::build_orchestrator(username, password)?;
    let mut events = orchestrator.events().subscribe();

    // Adopt whatever is already in the mount table first, so mounting an
    // already-mounted share is a clean no-op
    orchestrator.tick().await?;

    if all {
        for (share, error) in orchestrator.mount_all() {
            println!("{} {}: {}", "Skipped".yellow(), share, error);
        }
    } else {
        let Some(share) = share else {
            bail!("Specify a share as //host/share, or use --all");
        };
        let id = super::parse_share(&share, workgroup.as_deref(), login.as_deref())?;
        orchestrator.mount_share(&id)?;
    }

    // A slow but healthy mount may run a full helper invocation, so the
    // foreground wait is bounded far above the shutdown budget
    orchestrator.wait_idle_for(FOREGROUND_JOIN_TIMEOUT).await?;

    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ShareEvent::MountFailed { .. }) {
            failures += 1;
        }
        super::print_event(&event);
    }
    if failures > 0 {
        bail!("{failures} mount(s) failed");
    }
    Ok(())
}
