use super::reconciler::ShareRegistry;
use crate::config::{CustomSettingsStore, RemountFlag};
use crate::share::ShareId;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// What one remount pass decided to do.
#[derive(Debug, Default)]
pub struct RemountPlan {
    pub to_mount: Vec<ShareId>,
    /// Shares the policy gave up on this pass, with the attempt count.
    pub exhausted: Vec<(ShareId, u32)>,
}

/// Decides which flagged shares need a mount attempt on each trigger.
///
/// Attempt counts live here, not in the settings store: they are runtime
/// state and reset when the policy is re-armed (startup, network back
/// online), while the flags themselves persist.
#[derive(Default)]
pub struct RemountPolicy {
    attempts: HashMap<ShareId, u32>,
    exhausted: HashSet<ShareId>,
}

impl RemountPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute this trigger's plan. A share is a candidate when its
    /// share-level settings carry a remount flag and no current mount of
    /// ours satisfies it; foreign mounts of the same share do not count.
    pub fn plan(
        &mut self,
        store: &dyn CustomSettingsStore,
        registry: &ShareRegistry,
        retry_ceiling: u32,
    ) -> RemountPlan {
        let mut plan = RemountPlan::default();

        for (key, settings) in store.all() {
            if settings.remount == RemountFlag::None {
                continue;
            }
            // Host-level records carry no mountable target
            let Some(share_name) = key.share else {
                continue;
            };
            let id = ShareId::new(key.workgroup, key.host, share_name);

            if self.exhausted.contains(&id) {
                continue;
            }
            if registry
                .find_matching(&id)
                .is_some_and(|r| r.satisfies_remount())
            {
                self.attempts.remove(&id);
                continue;
            }

            let attempts = self.attempts.entry(id.clone()).or_insert(0);
            *attempts += 1;
            if *attempts > retry_ceiling {
                debug!("Giving up on remounting {} after {} attempts", id, retry_ceiling);
                self.exhausted.insert(id.clone());
                plan.exhausted.push((id, retry_ceiling));
            } else {
                plan.to_mount.push(id);
            }
        }

        plan
    }

    /// A mount of this share succeeded; its counter starts over.
    pub fn on_mount_success(&mut self, share: &ShareId) {
        self.attempts.remove(share);
        self.exhausted.remove(share);
    }

    /// Reset all counters and exhaustion marks. Called on the triggers
    /// that make retrying worthwhile again.
    pub fn re_arm(&mut self) {
        self.attempts.clear();
        self.exhausted.clear();
    }
}
