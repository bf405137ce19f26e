use anyhow::Result;
use std::path::{Path, PathBuf};

/// Expand tilde (~) in paths to home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        Ok(home.join(stripped))
    } else if path_str == "~" {
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the custom-settings file path
pub fn get_settings_path() -> crate::error::Result<PathBuf> {
    Ok(sharekeeper_dir()?.join("settings.json"))
}

/// Get the global configuration file path
pub fn get_config_path() -> crate::error::Result<PathBuf> {
    Ok(sharekeeper_dir()?.join("config.json"))
}

fn sharekeeper_dir() -> crate::error::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        crate::error::SharekeeperError::ConfigInvalid {
            message: "Could not determine home directory".to_string(),
        }
    })?;
    Ok(home.join(".sharekeeper"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_expand_path() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_path(Path::new("~/smb")).unwrap(), home.join("smb"));
        assert_eq!(expand_path(Path::new("~")).unwrap(), home);

        assert_eq!(
            expand_path(Path::new("/tmp/smb")).unwrap(),
            PathBuf::from("/tmp/smb")
        );
    }
}
