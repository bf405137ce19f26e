use super::helper::{CancelSignal, HelperOutput, MountHelper, wait_cancelled};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One scripted helper outcome.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Success,
    Fail { status: i32, stderr: String },
}

impl MockOutcome {
    pub fn auth_failure() -> Self {
        MockOutcome::Fail {
            status: 32,
            stderr: "mount error(13): Permission denied".to_string(),
        }
    }

    pub fn unreachable() -> Self {
        MockOutcome::Fail {
            status: 32,
            stderr: "mount error(110): Connection timed out".to_string(),
        }
    }

    pub fn bad_share_name() -> Self {
        MockOutcome::Fail {
            status: 32,
            stderr: "mount error(6): No such device or address".to_string(),
        }
    }
}

/// Test double for the privileged helper: scripted outcomes, invocation
/// recording, optional artificial latency to keep jobs in flight.
#[derive(Default)]
pub struct MockMountHelper {
    script: Mutex<VecDeque<MockOutcome>>,
    delay: Mutex<Duration>,
    mount_calls: AtomicUsize,
    unmount_calls: AtomicUsize,
    mount_sources: Mutex<Vec<String>>,
    unmount_targets: Mutex<Vec<PathBuf>>,
}

impl MockMountHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome; when the script runs dry every call succeeds.
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Artificial latency before each helper call completes.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn mount_calls(&self) -> usize {
        self.mount_calls.load(Ordering::SeqCst)
    }

    pub fn unmount_calls(&self) -> usize {
        self.unmount_calls.load(Ordering::SeqCst)
    }

    pub fn mount_sources(&self) -> Vec<String> {
        self.mount_sources.lock().unwrap().clone()
    }

    pub fn unmount_targets(&self) -> Vec<PathBuf> {
        self.unmount_targets.lock().unwrap().clone()
    }

    async fn next_outcome(&self, cancel: CancelSignal) -> HelperOutput {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_cancelled(cancel) => {
                    return HelperOutput {
                        status: None,
                        stderr: String::new(),
                        cancelled: true,
                    };
                }
            }
        }

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockOutcome::Success);
        match outcome {
            MockOutcome::Success => HelperOutput {
                status: Some(0),
                stderr: String::new(),
                cancelled: false,
            },
            MockOutcome::Fail { status, stderr } => HelperOutput {
                status: Some(status),
                stderr,
                cancelled: false,
            },
        }
    }
}

#[async_trait]
impl MountHelper for MockMountHelper {
    async fn mount(
        &self,
        source: &str,
        _mount_point: &Path,
        _options: &str,
        _password: Option<&str>,
        cancel: CancelSignal,
    ) -> Result<HelperOutput> {
        self.mount_calls.fetch_add(1, Ordering::SeqCst);
        self.mount_sources.lock().unwrap().push(source.to_string());
        Ok(self.next_outcome(cancel).await)
    }

    async fn unmount(
        &self,
        mount_point: &Path,
        _lazy: bool,
        cancel: CancelSignal,
    ) -> Result<HelperOutput> {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);
        self.unmount_targets
            .lock()
            .unwrap()
            .push(mount_point.to_path_buf());
        Ok(self.next_outcome(cancel).await)
    }

    fn check_health(&self) -> Result<()> {
        Ok(())
    }
}
