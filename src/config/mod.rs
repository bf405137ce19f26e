mod store;
mod types;

pub use store::{CustomSettingsStore, JsonSettingsStore, MemorySettingsStore};
pub use types::*;

use crate::error::Result;
use tracing::debug;

/// Load the global settings file, falling back to the defaults when it
/// does not exist. The mount prefix is tilde-expanded after loading.
pub fn load_global_settings() -> Result<GlobalSettings> {
    let path = crate::utils::paths::get_config_path()?;
    let mut settings = if path.exists() {
        debug!("Loading global settings from {:?}", path);
        let contents = std::fs::read_to_string(&path)?;
        serde_json::from_str(&contents)?
    } else {
        GlobalSettings::default()
    };
    settings.mount_prefix = crate::utils::paths::expand_path(&settings.mount_prefix)?;
    Ok(settings)
}
