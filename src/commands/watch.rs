use anyhow::Result;
use colored::*;
use std::time::Duration;
use tracing::{info, warn};

/// Run the reconciliation loop in the foreground until interrupted.
pub async fn execute(
    interval_secs: u64,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let mut orchestrator = super::build_orchestrator(username, password)?;
    orchestrator.check_health()?;
    let mut events = orchestrator.events().subscribe();

    // Startup is a remount trigger
    orchestrator.re_arm_remounts();

    println!(
        "{} (every {}s, Ctrl-C to stop)",
        "Watching SMB mounts".bold().cyan(),
        interval_secs
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = orchestrator.tick().await {
                    warn!("Reconciliation pass failed: {}", e);
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => super::print_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Dropped {} events", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    orchestrator.abort_all();
    orchestrator.wait_idle().await?;
    while let Ok(event) = events.try_recv() {
        super::print_event(&event);
    }
    Ok(())
}
