use super::types::{CustomSettings, RemountFlag, SettingsKey};
use crate::error::Result;
use atomicwrites::{AllowOverwrite, AtomicFile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Read/write access to per-host and per-share custom settings.
///
/// This subsystem only reads records for resolution and policy; the writes
/// it performs are limited to the `Once -> None` remount clear, the
/// force-clear on deliberate unmount, and host-to-share propagation.
pub trait CustomSettingsStore: Send {
    fn get(&self, key: &SettingsKey) -> Option<CustomSettings>;

    fn all(&self) -> Vec<(SettingsKey, CustomSettings)>;

    fn upsert(&mut self, key: SettingsKey, settings: CustomSettings) -> Result<()>;

    fn remove(&mut self, key: &SettingsKey) -> Result<()>;

    /// One-shot semantics: clear `Once` back to `None` after a successful
    /// remount. `Always` entries are left alone.
    fn clear_once_remount(&mut self, key: &SettingsKey) -> Result<()>;

    /// Force-clear path for a deliberate user unmount: clears any remount
    /// flag, including `Always`.
    fn force_clear_remount(&mut self, key: &SettingsKey) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEntry {
    key: SettingsKey,
    settings: CustomSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    entries: Vec<SettingsEntry>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// JSON-file-backed settings store with atomic writes and a `.json.bak`
/// backup of the previous contents.
pub struct JsonSettingsStore {
    path: PathBuf,
    entries: HashMap<SettingsKey, CustomSettings>,
}

impl JsonSettingsStore {
    pub fn new() -> Result<Self> {
        Self::with_path(crate::utils::paths::get_settings_path()?)
    }

    pub fn with_path(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            debug!("Loading custom settings from {:?}", path);
            let contents = fs::read_to_string(&path)?;
            let file: SettingsFile = serde_json::from_str(&contents)?;
            file.entries
                .into_iter()
                .map(|e| (e.key, e.settings))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(Self { path, entries })
    }

    pub fn settings_path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        if self.path.exists() {
            let backup_path = self.path.with_extension("json.bak");
            fs::copy(&self.path, backup_path)?;
        }

        let mut entries: Vec<SettingsEntry> = self
            .entries
            .iter()
            .map(|(key, settings)| SettingsEntry {
                key: key.clone(),
                settings: settings.clone(),
            })
            .collect();
        // Stable file contents regardless of map iteration order
        entries.sort_by(|a, b| {
            (&a.key.workgroup, &a.key.host, &a.key.share).cmp(&(
                &b.key.workgroup,
                &b.key.host,
                &b.key.share,
            ))
        });

        let file = SettingsFile {
            version: default_version(),
            entries,
        };
        let json = serde_json::to_string_pretty(&file)?;

        let af = AtomicFile::new(&self.path, AllowOverwrite);
        af.write(|f| f.write_all(json.as_bytes()))
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        debug!("Saved {} settings entries to {:?}", self.entries.len(), self.path);
        Ok(())
    }

    /// Copy a host-level record's explicit fields into a share-level record,
    /// preserving the share record's own explicit values.
    fn cascade_into(host: &CustomSettings, share: &mut CustomSettings) {
        macro_rules! cascade_field {
            ($field:ident) => {
                if !share.$field.is_explicit() && host.$field.is_explicit() {
                    share.$field = host.$field.clone();
                }
            };
        }

        cascade_field!(port);
        cascade_field!(security_mode);
        cascade_field!(write_access);
        cascade_field!(protocol_version);
        cascade_field!(uid);
        cascade_field!(gid);
        cascade_field!(fs_kind);
        cascade_field!(wol_mac_address);
        cascade_field!(wol_send_before_mount);
        cascade_field!(wol_send_before_scan);
    }
}

impl CustomSettingsStore for JsonSettingsStore {
    fn get(&self, key: &SettingsKey) -> Option<CustomSettings> {
        self.entries.get(key).cloned()
    }

    fn all(&self) -> Vec<(SettingsKey, CustomSettings)> {
        self.entries
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect()
    }

    fn upsert(&mut self, key: SettingsKey, settings: CustomSettings) -> Result<()> {
        if key.is_host_level() {
            // Host-level edits cascade to that host's known share records
            let share_keys: Vec<SettingsKey> = self
                .entries
                .keys()
                .filter(|k| {
                    !k.is_host_level() && k.host == key.host && k.workgroup == key.workgroup
                })
                .cloned()
                .collect();
            for share_key in share_keys {
                if let Some(share_settings) = self.entries.get_mut(&share_key) {
                    Self::cascade_into(&settings, share_settings);
                }
            }
        }

        self.entries.insert(key, settings);
        self.save()?;
        info!("Custom settings saved");
        Ok(())
    }

    fn remove(&mut self, key: &SettingsKey) -> Result<()> {
        if self.entries.remove(key).is_none() {
            warn!("No custom settings entry for {:?}", key);
            return Ok(());
        }
        self.save()
    }

    fn clear_once_remount(&mut self, key: &SettingsKey) -> Result<()> {
        let Some(settings) = self.entries.get_mut(key) else {
            return Ok(());
        };

        if settings.remount == RemountFlag::Once {
            settings.remount = RemountFlag::None;
            debug!("Cleared one-shot remount for {:?}", key);
            self.save()?;
        }
        Ok(())
    }

    fn force_clear_remount(&mut self, key: &SettingsKey) -> Result<()> {
        let Some(settings) = self.entries.get_mut(key) else {
            return Ok(());
        };

        if settings.remount != RemountFlag::None {
            settings.remount = RemountFlag::None;
            debug!("Force-cleared remount for {:?}", key);
            self.save()?;
        }
        Ok(())
    }
}

/// In-memory store for tests and for callers that bring their own
/// persistence.
#[derive(Default)]
pub struct MemorySettingsStore {
    entries: HashMap<SettingsKey, CustomSettings>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CustomSettingsStore for MemorySettingsStore {
    fn get(&self, key: &SettingsKey) -> Option<CustomSettings> {
        self.entries.get(key).cloned()
    }

    fn all(&self) -> Vec<(SettingsKey, CustomSettings)> {
        self.entries
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect()
    }

    fn upsert(&mut self, key: SettingsKey, settings: CustomSettings) -> Result<()> {
        self.entries.insert(key, settings);
        Ok(())
    }

    fn remove(&mut self, key: &SettingsKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear_once_remount(&mut self, key: &SettingsKey) -> Result<()> {
        if let Some(settings) = self.entries.get_mut(key)
            && settings.remount == RemountFlag::Once
        {
            settings.remount = RemountFlag::None;
        }
        Ok(())
    }

    fn force_clear_remount(&mut self, key: &SettingsKey) -> Result<()> {
        if let Some(settings) = self.entries.get_mut(key) {
            settings.remount = RemountFlag::None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Setting;
    use tempfile::TempDir;

    #[test]
    fn test_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        let mut store = JsonSettingsStore::with_path(path.clone()).unwrap();
        let key = SettingsKey::for_share("WG", "server", "data");
        let settings = CustomSettings {
            port: Setting::Explicit(139),
            remount: RemountFlag::Always,
            ..Default::default()
        };
        store.upsert(key.clone(), settings).unwrap();

        let reloaded = JsonSettingsStore::with_path(path).unwrap();
        let loaded = reloaded.get(&key).unwrap();
        assert_eq!(loaded.port, Setting::Explicit(139));
        assert_eq!(loaded.remount, RemountFlag::Always);
    }

    #[test]
    fn test_backup_creation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        let mut store = JsonSettingsStore::with_path(path.clone()).unwrap();
        let key = SettingsKey::for_host("WG", "server");
        store.upsert(key.clone(), CustomSettings::default()).unwrap();
        store.remove(&key).unwrap();

        assert!(path.with_extension("json.bak").exists());
    }

    #[test]
    fn test_clear_once_leaves_always_alone() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        let mut store = JsonSettingsStore::with_path(path).unwrap();

        let once_key = SettingsKey::for_share("WG", "server", "a");
        let always_key = SettingsKey::for_share("WG", "server", "b");
        store
            .upsert(
                once_key.clone(),
                CustomSettings {
                    remount: RemountFlag::Once,
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .upsert(
                always_key.clone(),
                CustomSettings {
                    remount: RemountFlag::Always,
                    ..Default::default()
                },
            )
            .unwrap();

        store.clear_once_remount(&once_key).unwrap();
        store.clear_once_remount(&always_key).unwrap();
        assert_eq!(store.get(&once_key).unwrap().remount, RemountFlag::None);
        assert_eq!(store.get(&always_key).unwrap().remount, RemountFlag::Always);

        // The force-clear path does clear Always
        store.force_clear_remount(&always_key).unwrap();
        assert_eq!(store.get(&always_key).unwrap().remount, RemountFlag::None);
    }

    #[test]
    fn test_host_edit_cascades_to_shares() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        let mut store = JsonSettingsStore::with_path(path).unwrap();

        let share_key = SettingsKey::for_share("WG", "server", "data");
        store
            .upsert(
                share_key.clone(),
                CustomSettings {
                    uid: Setting::Explicit(1000),
                    ..Default::default()
                },
            )
            .unwrap();

        let host_key = SettingsKey::for_host("WG", "server");
        store
            .upsert(
                host_key,
                CustomSettings {
                    port: Setting::Explicit(139),
                    uid: Setting::Explicit(2000),
                    ..Default::default()
                },
            )
            .unwrap();

        let share = store.get(&share_key).unwrap();
        // Unset field picked up from the host edit
        assert_eq!(share.port, Setting::Explicit(139));
        // The share's own explicit value survives
        assert_eq!(share.uid, Setting::Explicit(1000));
    }
}
