use anyhow::{Result, bail};
use colored::*;
use sharekeeper::mount::ShareEvent;
use sharekeeper::platform::common::FOREGROUND_JOIN_TIMEOUT;

pub async fn execute(
    share: Option<String>,
    all: bool,
    force: bool,
    workgroup: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let mut orchestrator = super::build_orchestrator(username, password)?;
    let mut events = orchestrator.events().subscribe();

    orchestrator.tick().await?;

    if all {
        for (share, error) in orchestrator.unmount_all(force) {
            println!("{} {}: {}", "Skipped".yellow(), share, error);
        }
    } else {
        let Some(share) = share else {
            bail!("Specify a share as //host/share, or use --all");
        };
        let id = super::parse_share(&share, workgroup.as_deref(), None)?;
        orchestrator.unmount_share(&id, force)?;
    }

    orchestrator.wait_idle_for(FOREGROUND_JOIN_TIMEOUT).await?;

    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ShareEvent::UnmountFailed { .. }) {
            failures += 1;
        }
        super::print_event(&event);
    }
    if failures > 0 {
        bail!("{failures} unmount(s) failed");
    }
    Ok(())
}
