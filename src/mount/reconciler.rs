use super::events::{EventBus, ShareEvent};
use super::jobs::JobKey;
use super::table::{ObservedMount, probe_mount_point};
use crate::config::GlobalSettings;
use crate::share::{MountOwnership, MountState, ShareId, ShareRecord};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// In-memory set of known shares and their runtime state. Single-owner;
/// the control loop is the only writer.
#[derive(Default)]
pub struct ShareRegistry {
    records: HashMap<ShareId, ShareRecord>,
}

impl ShareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ShareId) -> Option<&ShareRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &ShareId) -> Option<&mut ShareRecord> {
        self.records.get_mut(id)
    }

    pub fn upsert(&mut self, record: ShareRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn remove(&mut self, id: &ShareId) -> Option<ShareRecord> {
        self.records.remove(id)
    }

    pub fn all(&self) -> Vec<ShareRecord> {
        let mut records: Vec<ShareRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.unc().cmp(&b.id.unc()));
        records
    }

    pub fn mounted(&self) -> Vec<ShareRecord> {
        self.all().into_iter().filter(|r| r.is_mounted()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Identity match ignoring case and, when only one side carries it,
    /// the login. An observed mount's login must not split it from the
    /// record the user asked to mount.
    pub fn find_matching(&self, id: &ShareId) -> Option<&ShareRecord> {
        self.records.values().find(|r| ids_match(&r.id, id))
    }

    pub fn find_by_mount_point(&self, mount_point: &Path) -> Option<ShareId> {
        self.records
            .values()
            .find(|r| r.mount_point.as_deref() == Some(mount_point))
            .map(|r| r.id.clone())
    }
}

fn ids_match(a: &ShareId, b: &ShareId) -> bool {
    if !a.host.eq_ignore_ascii_case(&b.host) || !a.share.eq_ignore_ascii_case(&b.share) {
        return false;
    }
    match (&a.login, &b.login) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

/// Diffs the OS mount table against the registry on every tick. The mount
/// table is the source of truth; the registry converges toward it.
pub struct Reconciler {
    events: EventBus,
    current_uid: u32,
    mount_prefix: PathBuf,
    home_dir: Option<PathBuf>,
    detect_all_shares: bool,
}

impl Reconciler {
    pub fn new(events: EventBus, owner: MountOwnership, global: &GlobalSettings) -> Self {
        Self {
            events,
            current_uid: owner.uid,
            mount_prefix: global.mount_prefix.clone(),
            home_dir: dirs::home_dir(),
            detect_all_shares: global.detect_all_shares,
        }
    }

    /// A mount is ours only when it belongs to this uid and sits under the
    /// mount prefix or the home directory.
    fn is_foreign(&self, owner_uid: u32, mount_point: &Path) -> bool {
        if owner_uid != self.current_uid {
            return true;
        }
        let under_prefix = mount_point.starts_with(&self.mount_prefix);
        let under_home = self
            .home_dir
            .as_deref()
            .is_some_and(|home| mount_point.starts_with(home));
        !(under_prefix || under_home)
    }

    /// One reconciliation pass. Keys with a job in flight are left alone;
    /// their outcome will arrive through the job channel.
    pub async fn reconcile(
        &self,
        registry: &mut ShareRegistry,
        observed: Vec<ObservedMount>,
        busy: &HashSet<JobKey>,
    ) {
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for mount in observed {
            seen.insert(mount.mount_point.clone());
            if busy.contains(&JobKey::for_mount_point(&mount.mount_point)) {
                continue;
            }

            // Out-of-band probe: the mount table can list entries whose
            // mount point is no longer traversable
            let probe = probe_mount_point(&mount.mount_point).await;
            let owner = MountOwnership {
                uid: mount.uid.unwrap_or(probe.owner.uid),
                gid: mount.gid.unwrap_or(probe.owner.gid),
            };
            let foreign = self.is_foreign(owner.uid, &mount.mount_point);

            if foreign && !self.detect_all_shares {
                if let Some(id) = registry.find_by_mount_point(&mount.mount_point) {
                    registry.remove(&id);
                }
                continue;
            }

            let id = registry
                .find_by_mount_point(&mount.mount_point)
                .unwrap_or_else(|| mount.share_id());
            let mut record = registry
                .remove(&id)
                .unwrap_or_else(|| ShareRecord::new(id.clone()));

            let newly_mounted = !record.is_mounted();
            record.state = if probe.accessible {
                MountState::Mounted
            } else {
                MountState::Inaccessible
            };
            record.fs_kind = mount.fs_kind;
            record.mount_point = Some(mount.mount_point.clone());
            record.owner = Some(owner);
            record.foreign = foreign;
            record.usage = probe.usage;
            if record.host_addr.is_none() {
                record.host_addr = mount.addr;
            }

            if newly_mounted {
                info!(
                    "Adopted {} mount of {} at {}",
                    if foreign { "foreign" } else { "existing" },
                    record.id,
                    mount.mount_point.display()
                );
                self.events.publish(ShareEvent::Mounted {
                    share: record.id.clone(),
                    mount_point: mount.mount_point.clone(),
                });
            }
            registry.upsert(record);
        }

        // Mounts that disappeared out from under us
        let vanished: Vec<ShareId> = registry
            .all()
            .into_iter()
            .filter(|r| r.is_mounted())
            .filter(|r| {
                r.mount_point.as_deref().is_some_and(|p| {
                    !seen.contains(p) && !busy.contains(&JobKey::for_mount_point(p))
                })
            })
            .map(|r| r.id)
            .collect();

        for id in vanished {
            let Some(record) = registry.get_mut(&id) else {
                continue;
            };
            let mount_point = record
                .mount_point
                .clone()
                .unwrap_or_default();
            debug!("Mount of {} vanished from the mount table", id);

            // Event first, while the record still carries its fields
            self.events.publish(ShareEvent::Unmounted {
                share: id.clone(),
                mount_point,
            });

            if record.foreign {
                registry.remove(&id);
            } else {
                record.clear_mount_fields();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::FilesystemKind;
    use tempfile::TempDir;

    fn observed(mount_point: &Path, uid: u32) -> ObservedMount {
        ObservedMount {
            mount_point: mount_point.to_path_buf(),
            fs_kind: FilesystemKind::Cifs,
            host: "server".to_string(),
            share: "data".to_string(),
            workgroup: "WG".to_string(),
            addr: None,
            login: "alice".to_string(),
            uid: Some(uid),
            gid: Some(100),
        }
    }

    fn current_uid() -> u32 {
        nix::unistd::getuid().as_raw()
    }

    fn reconciler(prefix: &Path, detect_all: bool) -> (Reconciler, EventBus) {
        let events = EventBus::new(16);
        let global = GlobalSettings {
            mount_prefix: prefix.to_path_buf(),
            detect_all_shares: detect_all,
            ..Default::default()
        };
        let owner = MountOwnership {
            uid: current_uid(),
            gid: 100,
        };
        (Reconciler::new(events.clone(), owner, &global), events)
    }

    #[tokio::test]
    async fn test_adopts_our_existing_mount() {
        let temp = TempDir::new().unwrap();
        let mount_point = temp.path().join("server").join("data");
        std::fs::create_dir_all(&mount_point).unwrap();

        let (reconciler, events) = reconciler(temp.path(), true);
        let mut subscriber = events.subscribe();
        let mut registry = ShareRegistry::new();

        reconciler
            .reconcile(
                &mut registry,
                vec![observed(&mount_point, current_uid())],
                &HashSet::new(),
            )
            .await;

        let record = registry
            .find_matching(&ShareId::new("WG", "server", "data"))
            .unwrap();
        assert_eq!(record.state, MountState::Mounted);
        assert!(!record.foreign);
        assert_eq!(record.mount_point.as_deref(), Some(mount_point.as_path()));

        assert!(matches!(
            subscriber.try_recv().unwrap(),
            ShareEvent::Mounted { .. }
        ));
    }

    #[tokio::test]
    async fn test_other_uid_is_foreign() {
        let temp = TempDir::new().unwrap();
        let mount_point = temp.path().join("server").join("data");
        std::fs::create_dir_all(&mount_point).unwrap();

        let (reconciler, _events) = reconciler(temp.path(), true);
        let mut registry = ShareRegistry::new();

        reconciler
            .reconcile(
                &mut registry,
                vec![observed(&mount_point, current_uid() + 1)],
                &HashSet::new(),
            )
            .await;

        let record = registry
            .find_matching(&ShareId::new("WG", "server", "data"))
            .unwrap();
        assert!(record.foreign);
    }

    #[tokio::test]
    async fn test_outside_prefix_and_home_is_foreign() {
        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let mount_point = outside.path().join("data");
        std::fs::create_dir_all(&mount_point).unwrap();

        let (mut reconciler, _events) = reconciler(temp.path(), true);
        // Pin the home dir away from the real one so tmpdirs can't be under it
        reconciler.home_dir = Some(PathBuf::from("/nonexistent-home"));
        let mut registry = ShareRegistry::new();

        reconciler
            .reconcile(
                &mut registry,
                vec![observed(&mount_point, current_uid())],
                &HashSet::new(),
            )
            .await;

        assert!(
            registry
                .find_matching(&ShareId::new("WG", "server", "data"))
                .unwrap()
                .foreign
        );
    }

    #[tokio::test]
    async fn test_foreign_dropped_when_detection_disabled() {
        let temp = TempDir::new().unwrap();
        let mount_point = temp.path().join("server").join("data");
        std::fs::create_dir_all(&mount_point).unwrap();

        let (reconciler, _events) = reconciler(temp.path(), false);
        let mut registry = ShareRegistry::new();

        reconciler
            .reconcile(
                &mut registry,
                vec![observed(&mount_point, current_uid() + 1)],
                &HashSet::new(),
            )
            .await;

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_mount_emits_event_before_purge() {
        let temp = TempDir::new().unwrap();
        let mount_point = temp.path().join("server").join("data");
        std::fs::create_dir_all(&mount_point).unwrap();

        let (reconciler, events) = reconciler(temp.path(), true);
        let mut registry = ShareRegistry::new();

        reconciler
            .reconcile(
                &mut registry,
                vec![observed(&mount_point, current_uid())],
                &HashSet::new(),
            )
            .await;

        let mut subscriber = events.subscribe();
        // Next pass observes nothing: the mount is gone
        reconciler
            .reconcile(&mut registry, vec![], &HashSet::new())
            .await;

        match subscriber.try_recv().unwrap() {
            ShareEvent::Unmounted {
                share,
                mount_point: mp,
            } => {
                // The event still carries the last-known mount point
                assert_eq!(share.host, "server");
                assert_eq!(mp, mount_point);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Our record survives unmounted; its mount fields are cleared
        let record = registry
            .find_matching(&ShareId::new("WG", "server", "data"))
            .unwrap();
        assert_eq!(record.state, MountState::Unmounted);
        assert!(record.mount_point.is_none());
    }

    #[tokio::test]
    async fn test_busy_keys_are_skipped() {
        let temp = TempDir::new().unwrap();
        let mount_point = temp.path().join("server").join("data");
        std::fs::create_dir_all(&mount_point).unwrap();

        let (reconciler, _events) = reconciler(temp.path(), true);
        let mut registry = ShareRegistry::new();
        let busy: HashSet<JobKey> = [JobKey::for_mount_point(&mount_point)].into();

        reconciler
            .reconcile(
                &mut registry,
                vec![observed(&mount_point, current_uid())],
                &busy,
            )
            .await;

        // In-flight key untouched; the job outcome will settle it
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_inaccessible_mount_point() {
        let temp = TempDir::new().unwrap();
        let mount_point = temp.path().join("server").join("gone");
        // Never created on disk

        let (reconciler, _events) = reconciler(temp.path(), true);
        let mut registry = ShareRegistry::new();

        reconciler
            .reconcile(
                &mut registry,
                vec![observed(&mount_point, current_uid())],
                &HashSet::new(),
            )
            .await;

        let record = registry
            .find_matching(&ShareId::new("WG", "server", "data"))
            .unwrap();
        assert_eq!(record.state, MountState::Inaccessible);
        // Still counts as mounted for remount purposes
        assert!(record.is_mounted());
    }
}
