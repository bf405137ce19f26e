use super::events::OperationKind;
use crate::error::{Result, SharekeeperError};
use crate::share::ShareId;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::debug;

/// Canonical identity of an in-flight operation: one key per mount point.
///
/// Mount and unmount of the same mount point collide on purpose; that is
/// what serializes operations per share.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey(PathBuf);

impl JobKey {
    pub fn for_mount_point(path: &Path) -> Self {
        Self(path.to_path_buf())
    }

    pub fn mount_point(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitting,
    InFlight,
}

/// An in-flight privileged operation.
pub struct MountJob {
    pub key: JobKey,
    pub share: ShareId,
    pub kind: OperationKind,
    pub state: JobState,
    /// Set when the remount policy submitted this job; transient failures
    /// on such attempts stay quiet until the retry ceiling is reached.
    pub policy_retry: bool,
    cancel: Option<watch::Sender<bool>>,
}

impl MountJob {
    /// Best-effort cooperative cancellation. The helper may complete
    /// anyway; its result is still applied when it arrives.
    pub fn request_cancel(&mut self) -> bool {
        match self.cancel.take() {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }
}

/// Terminal result of one job, funneled back to the control loop.
#[derive(Debug)]
pub enum JobResult {
    Success,
    Cancelled,
    Failed(SharekeeperError),
}

#[derive(Debug)]
pub struct JobOutcome {
    pub key: JobKey,
    pub share: ShareId,
    pub kind: OperationKind,
    pub result: JobResult,
}

/// Owns every outstanding job and enforces the central concurrency
/// invariant: at most one job per key at any time.
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<JobKey, MountJob>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a key. Fails with `AlreadyInProgress` while any job holds it.
    pub fn begin(&mut self, key: JobKey, share: ShareId, kind: OperationKind) -> Result<()> {
        if self.jobs.contains_key(&key) {
            return Err(SharekeeperError::AlreadyInProgress {
                mount_point: key.mount_point().to_path_buf(),
            });
        }

        debug!("Job submitted: {} {}", kind, key);
        self.jobs.insert(
            key.clone(),
            MountJob {
                key,
                share,
                kind,
                state: JobState::Submitting,
                policy_retry: false,
                cancel: None,
            },
        );
        Ok(())
    }

    /// Flag a job as submitted by the remount policy rather than a user.
    pub fn mark_policy_retry(&mut self, key: &JobKey) {
        if let Some(job) = self.jobs.get_mut(key) {
            job.policy_retry = true;
        }
    }

    /// Transition Submitting -> InFlight once the helper task is spawned.
    pub fn mark_in_flight(&mut self, key: &JobKey, cancel: watch::Sender<bool>) {
        if let Some(job) = self.jobs.get_mut(key) {
            job.state = JobState::InFlight;
            job.cancel = Some(cancel);
        }
    }

    /// Remove a completed job. Returns it so the caller can inspect kind
    /// and share.
    pub fn complete(&mut self, key: &JobKey) -> Option<MountJob> {
        let job = self.jobs.remove(key);
        if job.is_some() {
            debug!("Job completed: {}", key);
        }
        job
    }

    /// Drop a job that failed before its helper task was spawned.
    pub fn cancel_submission(&mut self, key: &JobKey) {
        self.jobs.remove(key);
    }

    pub fn abort(&mut self, key: &JobKey) -> bool {
        match self.jobs.get_mut(key) {
            Some(job) => job.request_cancel(),
            None => false,
        }
    }

    pub fn abort_all(&mut self) {
        for job in self.jobs.values_mut() {
            job.request_cancel();
        }
    }

    pub fn is_busy(&self, key: &JobKey) -> bool {
        self.jobs.contains_key(key)
    }

    /// Keys reconciliation must not touch while their jobs are in flight.
    pub fn busy_keys(&self) -> HashSet<JobKey> {
        self.jobs.keys().cloned().collect()
    }

    pub fn busy_share(&self, share: &ShareId) -> bool {
        self.jobs.values().any(|job| &job.share == share)
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }
}
