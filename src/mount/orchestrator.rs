use super::events::{EventBus, OperationKind, ShareEvent};
use super::executor::MountExecutor;
use super::helper::MountHelper;
use super::jobs::{JobKey, JobOutcome, JobRegistry, JobResult};
use super::option_string::OptionStringBuilder;
use super::reconciler::{Reconciler, ShareRegistry};
use super::remount::RemountPolicy;
use super::table::{ObservedMount, read_mount_table};
use crate::config::{CustomSettingsStore, GlobalSettings, SettingsKey};
use crate::credentials::CredentialProvider;
use crate::error::{Result, SharekeeperError};
use crate::options::{EffectiveOptions, resolve};
use crate::platform::common::SHUTDOWN_JOIN_TIMEOUT;
use crate::share::{MountOwnership, MountState, ShareId, ShareRecord};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Uid/gid of this process, used both for option defaults and for foreign
/// classification.
pub fn current_process_owner() -> MountOwnership {
    #[cfg(unix)]
    {
        MountOwnership {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
    #[cfg(not(unix))]
    {
        MountOwnership { uid: 0, gid: 0 }
    }
}

/// Single entry point for mount lifecycle operations.
///
/// Owns the registry, the job table and the remount policy; everything
/// else reaches in through events or the query methods. Not `Sync` by
/// design: one control loop drives it.
pub struct MountOrchestrator {
    global: GlobalSettings,
    store: Box<dyn CustomSettingsStore>,
    executor: MountExecutor,
    registry: ShareRegistry,
    jobs: JobRegistry,
    remount: RemountPolicy,
    reconciler: Reconciler,
    events: EventBus,
    outcomes: mpsc::UnboundedReceiver<JobOutcome>,
    owner: MountOwnership,
}

impl MountOrchestrator {
    pub fn new(
        global: GlobalSettings,
        store: Box<dyn CustomSettingsStore>,
        helper: Arc<dyn MountHelper>,
        builder: Arc<dyn OptionStringBuilder>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self::with_owner(
            global,
            store,
            helper,
            builder,
            credentials,
            current_process_owner(),
        )
    }

    pub fn with_owner(
        global: GlobalSettings,
        store: Box<dyn CustomSettingsStore>,
        helper: Arc<dyn MountHelper>,
        builder: Arc<dyn OptionStringBuilder>,
        credentials: Arc<dyn CredentialProvider>,
        owner: MountOwnership,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let events = EventBus::default();
        let executor = MountExecutor::new(helper, builder, credentials, outcome_tx);
        let reconciler = Reconciler::new(events.clone(), owner, &global);

        Self {
            global,
            store,
            executor,
            registry: ShareRegistry::new(),
            jobs: JobRegistry::new(),
            remount: RemountPolicy::new(),
            reconciler,
            events,
            outcomes: outcome_rx,
            owner,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn shares(&self) -> Vec<ShareRecord> {
        self.registry.all()
    }

    pub fn mounted_shares(&self) -> Vec<ShareRecord> {
        self.registry.mounted()
    }

    pub fn store(&self) -> &dyn CustomSettingsStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn CustomSettingsStore {
        self.store.as_mut()
    }

    pub fn has_jobs_in_flight(&self) -> bool {
        !self.jobs.is_empty()
    }

    pub fn check_health(&self) -> Result<()> {
        self.executor.check_health()
    }

    fn resolve_options(&self, share: &ShareId) -> EffectiveOptions {
        let host_settings = self
            .store
            .get(&SettingsKey::for_host(&share.workgroup, &share.host));
        let share_settings = self.store.get(&SettingsKey::for_share(
            &share.workgroup,
            &share.host,
            &share.share,
        ));
        resolve(
            share,
            host_settings.as_ref(),
            share_settings.as_ref(),
            &self.global,
            self.owner,
        )
    }

    /// Submit a mount. Idempotent: a share already mounted by us is a
    /// successful no-op, and so is a share that already has a job in
    /// flight.
    pub fn mount_share(&mut self, share: &ShareId) -> Result<()> {
        self.submit_mount(share, false)
    }

    fn submit_mount(&mut self, share: &ShareId, policy_retry: bool) -> Result<()> {
        self.executor.validate_mount(share)?;

        if let Some(existing) = self.registry.find_matching(share) {
            if existing.satisfies_remount() {
                debug!("{} is already mounted, nothing to do", share);
                return Ok(());
            }
        }

        let options = self.resolve_options(share);
        let mount_point = options.mount_point_for(share);
        let key = JobKey::for_mount_point(&mount_point);

        match self.jobs.begin(key.clone(), share.clone(), OperationKind::Mount) {
            Ok(()) => {}
            Err(SharekeeperError::AlreadyInProgress { .. }) => {
                debug!("{} already has a job in flight, nothing to do", share);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        if policy_retry {
            self.jobs.mark_policy_retry(&key);
        }
        self.events.publish(ShareEvent::AboutToStart {
            share: share.clone(),
            kind: OperationKind::Mount,
        });

        let mut record = self
            .registry
            .find_matching(share)
            .cloned()
            .unwrap_or_else(|| ShareRecord::new(share.clone()));
        record.state = MountState::Mounting;
        record.fs_kind = options.fs_kind;
        record.port = Some(options.port);
        record.mount_point = Some(mount_point);
        self.registry.upsert(record);

        let job = self.executor.spawn_mount(key.clone(), share.clone(), options);
        self.jobs.mark_in_flight(&key, job.cancel);
        Ok(())
    }

    /// Submit an unmount. Idempotent for shares that are not mounted or
    /// that already have a job in flight; foreign mounts are refused
    /// before any helper invocation unless `force` is set.
    pub fn unmount_share(&mut self, share: &ShareId, force: bool) -> Result<()> {
        let Some(record) = self.registry.find_matching(share).cloned() else {
            debug!("{} is not known, nothing to unmount", share);
            return Ok(());
        };
        if !record.is_mounted() {
            return Ok(());
        }
        if record.foreign && !force {
            return Err(SharekeeperError::ForeignMountRefused {
                mount_point: record.mount_point.clone().unwrap_or_default(),
                owner_uid: record.owner.map(|o| o.uid).unwrap_or_default(),
            });
        }
        let Some(mount_point) = record.mount_point.clone() else {
            return Ok(());
        };

        let key = JobKey::for_mount_point(&mount_point);
        match self
            .jobs
            .begin(key.clone(), record.id.clone(), OperationKind::Unmount)
        {
            Ok(()) => {}
            Err(SharekeeperError::AlreadyInProgress { .. }) => {
                debug!("{} already has a job in flight, nothing to do", share);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        self.events.publish(ShareEvent::AboutToStart {
            share: record.id.clone(),
            kind: OperationKind::Unmount,
        });

        if let Some(r) = self.registry.get_mut(&record.id) {
            r.state = MountState::Unmounting;
        }

        // A lazy detach is the only way out of an inaccessible mount
        let lazy = force || record.state == MountState::Inaccessible;
        let job = self.executor.spawn_unmount(key.clone(), record.id, lazy);
        self.jobs.mark_in_flight(&key, job.cancel);
        Ok(())
    }

    /// Mount every known share that is not currently mounted. Known means
    /// present in the registry or carrying stored share-level settings, so
    /// this works on a fresh start before anything has been observed.
    pub fn mount_all(&mut self) -> Vec<(ShareId, SharekeeperError)> {
        let mut failures = Vec::new();
        let mut candidates: Vec<ShareId> = self
            .registry
            .all()
            .into_iter()
            .filter(|r| !r.is_mounted())
            .map(|r| r.id)
            .collect();

        for (key, _) in self.store.all() {
            let Some(share_name) = &key.share else {
                continue;
            };
            let id = ShareId::new(key.workgroup.clone(), key.host.clone(), share_name.clone());
            if self.registry.find_matching(&id).is_none() && !candidates.contains(&id) {
                candidates.push(id);
            }
        }

        for share in candidates {
            if let Err(e) = self.mount_share(&share) {
                failures.push((share, e));
            }
        }
        failures
    }

    /// Unmount every mount of ours. Foreign mounts stay untouched unless
    /// `force` is set.
    pub fn unmount_all(&mut self, force: bool) -> Vec<(ShareId, SharekeeperError)> {
        let mut failures = Vec::new();
        for record in self.registry.mounted() {
            if record.foreign && !force {
                continue;
            }
            if let Err(e) = self.unmount_share(&record.id, force) {
                failures.push((record.id, e));
            }
        }
        failures
    }

    /// Request cancellation of the in-flight job for a share, if any.
    pub fn abort(&mut self, share: &ShareId) -> bool {
        let Some(record) = self.registry.find_matching(share) else {
            return false;
        };
        let Some(mount_point) = record.mount_point.clone() else {
            return false;
        };
        self.jobs.abort(&JobKey::for_mount_point(&mount_point))
    }

    pub fn abort_all(&mut self) {
        self.jobs.abort_all();
    }

    /// Reset remount exhaustion, e.g. when the network comes back online.
    pub fn re_arm_remounts(&mut self) {
        self.remount.re_arm();
    }

    /// Apply every job outcome that has arrived so far.
    pub fn process_outcomes(&mut self) {
        while let Ok(outcome) = self.outcomes.try_recv() {
            self.apply_outcome(outcome);
        }
    }

    fn apply_outcome(&mut self, outcome: JobOutcome) {
        let Some(job) = self.jobs.complete(&outcome.key) else {
            warn!("Outcome for unknown job {}", outcome.key);
            return;
        };
        let share = outcome.share;
        let settings_key =
            SettingsKey::for_share(&share.workgroup, &share.host, &share.share);
        // The record may be keyed with a login the job id lacks
        let registry_id = self
            .registry
            .find_matching(&job.share)
            .map(|r| r.id.clone())
            .unwrap_or_else(|| job.share.clone());

        match (outcome.kind, outcome.result) {
            (OperationKind::Mount, JobResult::Success) => {
                if let Some(record) = self.registry.get_mut(&registry_id) {
                    record.state = MountState::Mounted;
                    record.owner = Some(self.owner);
                    record.foreign = false;
                }
                info!("Mounted {}", share);
                self.events.publish(ShareEvent::Mounted {
                    share: share.clone(),
                    mount_point: outcome.key.mount_point().to_path_buf(),
                });

                self.remount.on_mount_success(&share);
                if let Err(e) = self.store.clear_once_remount(&settings_key) {
                    warn!("Failed to clear one-shot remount flag: {}", e);
                }
                self.touch_last_used(&settings_key);
            }
            (OperationKind::Mount, JobResult::Failed(e)) => {
                if let Some(record) = self.registry.get_mut(&registry_id) {
                    record.clear_mount_fields();
                }
                if job.policy_retry && e.is_transient() {
                    // Retries against an unreachable host stay quiet; the
                    // exhaustion event is the one notification the user gets
                    debug!("Remount attempt for {} failed: {}", share, e);
                } else {
                    warn!("Mounting {} failed: {}", share, e);
                    self.events.publish(ShareEvent::MountFailed {
                        share: share.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            (OperationKind::Mount, JobResult::Cancelled) => {
                if let Some(record) = self.registry.get_mut(&registry_id) {
                    record.clear_mount_fields();
                }
                info!("Mounting {} cancelled", share);
            }
            (OperationKind::Unmount, JobResult::Success) => {
                info!("Unmounted {}", share);
                // Event first, then the record loses its mount fields
                self.events.publish(ShareEvent::Unmounted {
                    share: share.clone(),
                    mount_point: outcome.key.mount_point().to_path_buf(),
                });
                if let Some(record) = self.registry.get_mut(&registry_id) {
                    record.clear_mount_fields();
                }
                // A deliberate unmount always disarms the remount flag
                if let Err(e) = self.store.force_clear_remount(&settings_key) {
                    warn!("Failed to clear remount flag: {}", e);
                }
            }
            (OperationKind::Unmount, JobResult::Failed(e)) => {
                if let Some(record) = self.registry.get_mut(&registry_id) {
                    record.state = MountState::Mounted;
                }
                warn!("Unmounting {} failed: {}", share, e);
                self.events.publish(ShareEvent::UnmountFailed {
                    share: share.clone(),
                    reason: e.to_string(),
                });
            }
            (OperationKind::Unmount, JobResult::Cancelled) => {
                if let Some(record) = self.registry.get_mut(&registry_id) {
                    record.state = MountState::Mounted;
                }
                info!("Unmounting {} cancelled", share);
            }
        }

        self.events.publish(ShareEvent::Finished {
            share,
            kind: outcome.kind,
        });
    }

    fn touch_last_used(&mut self, key: &SettingsKey) {
        if let Some(mut settings) = self.store.get(key) {
            settings.last_used = Some(chrono::Utc::now());
            if let Err(e) = self.store.upsert(key.clone(), settings) {
                warn!("Failed to record last-used timestamp: {}", e);
            }
        }
    }

    /// One full control-loop pass against the live OS mount table.
    pub async fn tick(&mut self) -> Result<()> {
        let observed = read_mount_table().await?;
        self.reconcile_with(observed).await;
        Ok(())
    }

    /// One full control-loop pass against a caller-supplied observation,
    /// used by tests and by callers that already read the table.
    pub async fn reconcile_with(&mut self, observed: Vec<ObservedMount>) {
        self.process_outcomes();

        let busy = self.jobs.busy_keys();
        self.reconciler
            .reconcile(&mut self.registry, observed, &busy)
            .await;

        self.run_remount_pass();
    }

    fn run_remount_pass(&mut self) {
        let plan = self.remount.plan(
            self.store.as_ref(),
            &self.registry,
            self.global.remount_retry_ceiling,
        );

        for (share, attempts) in plan.exhausted {
            warn!("Remount of {} exhausted after {} attempts", share, attempts);
            self.events
                .publish(ShareEvent::RemountExhausted { share, attempts });
        }

        for share in plan.to_mount {
            if let Err(e) = self.submit_mount(&share, true) {
                warn!("Remount of {} not submitted: {}", share, e);
            }
        }
    }

    /// Wait for every in-flight job, bounded by the shutdown budget. Only
    /// suitable for shutdown: a healthy job can outlive this bound.
    pub async fn wait_idle(&mut self) -> Result<()> {
        self.wait_idle_for(SHUTDOWN_JOIN_TIMEOUT).await
    }

    /// Wait for every in-flight job, bounded by `limit`. Foreground
    /// commands pass a bound that covers a full helper invocation;
    /// outcomes that arrive in time are applied normally.
    pub async fn wait_idle_for(&mut self, limit: std::time::Duration) -> Result<()> {
        self.process_outcomes();
        if self.jobs.is_empty() {
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + limit;
        while !self.jobs.is_empty() {
            match tokio::time::timeout_at(deadline, self.outcomes.recv()).await {
                Ok(Some(outcome)) => self.apply_outcome(outcome),
                // The executor holds a sender for as long as we do, so a
                // closed channel means we are shutting down anyway
                Ok(None) => break,
                Err(_) => {
                    return Err(SharekeeperError::Other(anyhow::anyhow!(
                        "timed out after {:?} with {} job(s) still in flight",
                        limit,
                        self.jobs.len()
                    )));
                }
            }
        }
        Ok(())
    }
}
