use anyhow::{Result, bail};
use colored::*;
use sharekeeper::config::{CustomSettingsStore, JsonSettingsStore, RemountFlag, SettingsKey};

/// Set or clear the remount flag for a share.
pub async fn execute(share: String, flag: String, workgroup: Option<String>) -> Result<()> {
    let id = super::parse_share(&share, workgroup.as_deref(), None)?;
    let flag = match flag.to_lowercase().as_str() {
        "none" | "off" => RemountFlag::None,
        "once" => RemountFlag::Once,
        "always" => RemountFlag::Always,
        other => bail!("Invalid remount flag: {other} (expected none, once or always)"),
    };

    let mut store = JsonSettingsStore::new()?;
    let key = SettingsKey::for_share(&id.workgroup, &id.host, &id.share);
    let mut settings = store.get(&key).unwrap_or_default();
    settings.remount = flag;
    store.upsert(key, settings)?;

    let rendered = match flag {
        RemountFlag::None => "none".normal(),
        RemountFlag::Once => "once".yellow(),
        RemountFlag::Always => "always".green(),
    };
    println!("Remount flag for {} set to {}", id.unc().cyan(), rendered);
    Ok(())
}
