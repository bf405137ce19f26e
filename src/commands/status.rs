use anyhow::Result;
use colored::*;
use sharekeeper::share::{MountState, ShareRecord};

pub async fn execute(json: bool, username: Option<String>, password: Option<String>) -> Result<()> {
    let mut orchestrator = super::build_orchestrator(username, password)?;
    orchestrator.tick().await?;
    let shares = orchestrator.shares();

    if json {
        println!("{}", serde_json::to_string_pretty(&shares)?);
        return Ok(());
    }

    println!("{}", "Mounted Shares".bold().cyan());
    println!("{}", "==============".cyan());
    println!();

    if shares.is_empty() {
        println!("  No SMB shares mounted");
        println!();
        println!(
            "  Mount one with: {}",
            "sharekeeper mount //host/share".cyan()
        );
        return Ok(());
    }

    for record in &shares {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &ShareRecord) {
    println!("  {}:", record.id.unc().cyan().bold());

    let state = match record.state {
        MountState::Mounted => "mounted".green().to_string(),
        MountState::Inaccessible => "inaccessible".red().to_string(),
        MountState::Mounting => "mounting...".yellow().to_string(),
        MountState::Unmounting => "unmounting...".yellow().to_string(),
        MountState::Unmounted => "not mounted".normal().to_string(),
    };
    println!("    State: {}", state);

    if let Some(mount_point) = &record.mount_point {
        println!("    Mount point: {}", mount_point.display());
    }
    if record.foreign {
        println!("    Owner: {}", "another user".yellow());
    }
    if record.usage.total_bytes > 0 {
        println!(
            "    Usage: {} free of {}",
            human_bytes(record.usage.free_bytes),
            human_bytes(record.usage.total_bytes)
        );
    }
    println!();
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
