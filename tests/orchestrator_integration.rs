//! Integration tests for the mount orchestrator driven by the mock
//! helper: job serialization per mount point, idempotent re-entry,
//! one-shot credential retry, remount flag semantics with the retry
//! ceiling, and foreign-mount protection.

use sharekeeper::SharekeeperError;
use sharekeeper::config::{
    CustomSettings, CustomSettingsStore, GlobalSettings, MemorySettingsStore, RemountFlag,
    SettingsKey,
};
use sharekeeper::credentials::{
    CredentialProvider, Credentials, ScriptedCredentials, StaticCredentials,
};
use sharekeeper::mount::mock::{MockMountHelper, MockOutcome};
use sharekeeper::mount::{
    LinuxOptionStringBuilder, MountOrchestrator, ObservedMount, ShareEvent,
};
use sharekeeper::share::{FilesystemKind, MountOwnership, MountState, ShareId};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

const OWNER: MountOwnership = MountOwnership {
    uid: 4242,
    gid: 4242,
};

fn orchestrator(
    prefix: &Path,
    helper: Arc<MockMountHelper>,
    store: MemorySettingsStore,
    credentials: Arc<dyn CredentialProvider>,
    retry_ceiling: u32,
) -> MountOrchestrator {
    let global = GlobalSettings {
        mount_prefix: prefix.to_path_buf(),
        remount_retry_ceiling: retry_ceiling,
        ..Default::default()
    };
    MountOrchestrator::with_owner(
        global,
        Box::new(store),
        helper,
        Arc::new(LinuxOptionStringBuilder),
        credentials,
        OWNER,
    )
}

fn data_share() -> ShareId {
    ShareId::new("WG", "server", "data")
}

fn data_key() -> SettingsKey {
    SettingsKey::for_share("WG", "server", "data")
}

fn observed_at(mount_point: &Path, uid: u32) -> ObservedMount {
    ObservedMount {
        mount_point: mount_point.to_path_buf(),
        fs_kind: FilesystemKind::Cifs,
        host: "server".to_string(),
        share: "data".to_string(),
        workgroup: "WG".to_string(),
        addr: None,
        login: "alice".to_string(),
        uid: Some(uid),
        gid: Some(uid),
    }
}

fn drain(rx: &mut broadcast::Receiver<ShareEvent>) -> Vec<ShareEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_single_job_per_mount_point() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    helper.set_delay(Duration::from_secs(30));
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        MemorySettingsStore::new(),
        Arc::new(StaticCredentials::none()),
        5,
    );

    let mut events = orch.events().subscribe();
    orch.mount_share(&data_share()).unwrap();
    assert!(orch.has_jobs_in_flight());

    // A second mount of the same share is a silent no-op while the first
    // runs: no error, no second job
    orch.mount_share(&data_share()).unwrap();
    let started = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ShareEvent::AboutToStart { .. }))
        .count();
    assert_eq!(started, 1);

    // Cancellation ends the job; the registry record returns to unmounted
    assert!(orch.abort(&data_share()));
    orch.wait_idle().await.unwrap();
    assert!(!orch.has_jobs_in_flight());
    assert_eq!(helper.mount_calls(), 1);

    let record = orch
        .shares()
        .into_iter()
        .find(|r| r.id.share == "data")
        .unwrap();
    assert_eq!(record.state, MountState::Unmounted);
}

#[tokio::test]
async fn test_mount_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        MemorySettingsStore::new(),
        Arc::new(StaticCredentials::none()),
        5,
    );
    let mut events = orch.events().subscribe();

    orch.mount_share(&data_share()).unwrap();
    orch.wait_idle().await.unwrap();

    // Mounting again is a successful no-op: no new job, no new events
    orch.mount_share(&data_share()).unwrap();
    assert!(!orch.has_jobs_in_flight());
    assert_eq!(helper.mount_calls(), 1);

    let mounted = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ShareEvent::Mounted { .. }))
        .count();
    assert_eq!(mounted, 1);
}

#[tokio::test]
async fn test_auth_retry_prompts_exactly_once() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    helper.push_outcome(MockOutcome::auth_failure());
    let provider = Arc::new(ScriptedCredentials::answering(Credentials {
        username: "alice".to_string(),
        password: "secret".to_string(),
    }));
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        MemorySettingsStore::new(),
        provider.clone(),
        5,
    );

    orch.mount_share(&data_share()).unwrap();
    orch.wait_idle().await.unwrap();

    assert_eq!(provider.prompt_count(), 1);
    assert_eq!(helper.mount_calls(), 2);
    let record = orch
        .shares()
        .into_iter()
        .find(|r| r.id.share == "data")
        .unwrap();
    assert_eq!(record.state, MountState::Mounted);
}

#[tokio::test]
async fn test_once_flag_remounts_then_clears() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    let mut store = MemorySettingsStore::new();
    store
        .upsert(
            data_key(),
            CustomSettings {
                remount: RemountFlag::Once,
                ..Default::default()
            },
        )
        .unwrap();
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        store,
        Arc::new(StaticCredentials::none()),
        5,
    );

    // A reconciliation pass with no mount present triggers the remount
    orch.reconcile_with(vec![]).await;
    assert!(orch.has_jobs_in_flight());
    orch.wait_idle().await.unwrap();

    assert_eq!(helper.mount_calls(), 1);
    // One-shot semantics: the flag is cleared after the successful mount
    assert_eq!(
        orch.store().get(&data_key()).unwrap().remount,
        RemountFlag::None
    );

    // Further passes see a satisfied mount and do nothing
    orch.reconcile_with(vec![observed_at(
        &temp.path().join("server").join("data"),
        OWNER.uid,
    )])
    .await;
    orch.wait_idle().await.unwrap();
    assert_eq!(helper.mount_calls(), 1);
}

#[tokio::test]
async fn test_always_flag_survives_success_and_retries() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    let mut store = MemorySettingsStore::new();
    store
        .upsert(
            data_key(),
            CustomSettings {
                remount: RemountFlag::Always,
                ..Default::default()
            },
        )
        .unwrap();
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        store,
        Arc::new(StaticCredentials::none()),
        5,
    );

    orch.reconcile_with(vec![]).await;
    orch.wait_idle().await.unwrap();
    assert_eq!(helper.mount_calls(), 1);
    assert_eq!(
        orch.store().get(&data_key()).unwrap().remount,
        RemountFlag::Always
    );

    // The mount vanishes; the next pass mounts it again
    orch.reconcile_with(vec![]).await;
    orch.wait_idle().await.unwrap();
    assert_eq!(helper.mount_calls(), 2);
}

#[tokio::test]
async fn test_remount_exhaustion_and_re_arm() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    helper.push_outcome(MockOutcome::unreachable());
    helper.push_outcome(MockOutcome::unreachable());
    let mut store = MemorySettingsStore::new();
    store
        .upsert(
            data_key(),
            CustomSettings {
                remount: RemountFlag::Always,
                ..Default::default()
            },
        )
        .unwrap();
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        store,
        Arc::new(StaticCredentials::none()),
        2,
    );
    let mut events = orch.events().subscribe();

    for _ in 0..2 {
        orch.reconcile_with(vec![]).await;
        orch.wait_idle().await.unwrap();
    }
    assert_eq!(helper.mount_calls(), 2);

    // Ceiling reached: the next pass gives up and notifies, once
    orch.reconcile_with(vec![]).await;
    orch.wait_idle().await.unwrap();
    assert_eq!(helper.mount_calls(), 2);
    let seen = drain(&mut events);
    // The unreachable-host retries themselves stay quiet; exhaustion is
    // the single notification the user gets
    let failed = seen
        .iter()
        .filter(|e| matches!(e, ShareEvent::MountFailed { .. }))
        .count();
    assert_eq!(failed, 0);
    let exhausted = seen
        .iter()
        .filter(|e| matches!(e, ShareEvent::RemountExhausted { attempts: 2, .. }))
        .count();
    assert_eq!(exhausted, 1);

    // Re-arming (network back online) retries; the script is exhausted
    // now, so the mount succeeds
    orch.re_arm_remounts();
    orch.reconcile_with(vec![]).await;
    orch.wait_idle().await.unwrap();
    assert_eq!(helper.mount_calls(), 3);
    let record = orch
        .shares()
        .into_iter()
        .find(|r| r.id.share == "data")
        .unwrap();
    assert_eq!(record.state, MountState::Mounted);
}

#[tokio::test]
async fn test_foreign_unmount_refused_without_helper_call() {
    let temp = TempDir::new().unwrap();
    let mount_point = temp.path().join("server").join("data");
    std::fs::create_dir_all(&mount_point).unwrap();

    let helper = Arc::new(MockMountHelper::new());
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        MemorySettingsStore::new(),
        Arc::new(StaticCredentials::none()),
        5,
    );

    // Adopt a mount owned by a different uid
    orch.reconcile_with(vec![observed_at(&mount_point, OWNER.uid + 1)])
        .await;
    let record = orch
        .shares()
        .into_iter()
        .find(|r| r.id.share == "data")
        .unwrap();
    assert!(record.foreign);

    let err = orch.unmount_share(&data_share(), false).unwrap_err();
    assert!(matches!(err, SharekeeperError::ForeignMountRefused { .. }));
    // Refusal happens before the helper is ever invoked
    assert_eq!(helper.unmount_calls(), 0);

    // Force overrides the refusal
    orch.unmount_share(&data_share(), true).unwrap();
    orch.wait_idle().await.unwrap();
    assert_eq!(helper.unmount_calls(), 1);
}

#[tokio::test]
async fn test_deliberate_unmount_clears_always_flag() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    let mut store = MemorySettingsStore::new();
    store
        .upsert(
            data_key(),
            CustomSettings {
                remount: RemountFlag::Always,
                ..Default::default()
            },
        )
        .unwrap();
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        store,
        Arc::new(StaticCredentials::none()),
        5,
    );
    let mut events = orch.events().subscribe();

    orch.mount_share(&data_share()).unwrap();
    orch.wait_idle().await.unwrap();

    orch.unmount_share(&data_share(), false).unwrap();
    orch.wait_idle().await.unwrap();

    // The Unmounted event precedes the record losing its mount fields
    let events = drain(&mut events);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ShareEvent::Unmounted { .. }))
    );

    // The user unmounted on purpose, so even an Always flag is disarmed
    // and the next reconciliation pass does not remount
    assert_eq!(
        orch.store().get(&data_key()).unwrap().remount,
        RemountFlag::None
    );
    orch.reconcile_with(vec![]).await;
    assert!(!orch.has_jobs_in_flight());
    assert_eq!(helper.mount_calls(), 1);
}

#[tokio::test]
async fn test_unmount_of_unmounted_share_is_noop() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        MemorySettingsStore::new(),
        Arc::new(StaticCredentials::none()),
        5,
    );

    orch.unmount_share(&data_share(), false).unwrap();
    assert!(!orch.has_jobs_in_flight());
    assert_eq!(helper.unmount_calls(), 0);
}

#[tokio::test]
async fn test_mount_and_unmount_collide_on_one_mount_point() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        MemorySettingsStore::new(),
        Arc::new(StaticCredentials::none()),
        5,
    );

    orch.mount_share(&data_share()).unwrap();
    orch.wait_idle().await.unwrap();

    helper.set_delay(Duration::from_secs(30));
    orch.unmount_share(&data_share(), false).unwrap();

    // While the unmount runs, a mount of the same share is a silent
    // no-op: the mount point key is held by the unmount job
    orch.mount_share(&data_share()).unwrap();

    orch.abort_all();
    orch.wait_idle().await.unwrap();
    // The colliding mount never spawned a second helper invocation
    assert_eq!(helper.mount_calls(), 1);
}

#[tokio::test]
async fn test_user_initiated_mount_failure_is_reported() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    helper.push_outcome(MockOutcome::unreachable());
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        MemorySettingsStore::new(),
        Arc::new(StaticCredentials::none()),
        5,
    );
    let mut events = orch.events().subscribe();

    // An explicit mount request is not a policy retry: the user hears
    // about the unreachable host immediately
    orch.mount_share(&data_share()).unwrap();
    orch.wait_idle().await.unwrap();

    let failed = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ShareEvent::MountFailed { .. }))
        .count();
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn test_wait_bound_is_caller_supplied() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    helper.set_delay(Duration::from_millis(200));
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        MemorySettingsStore::new(),
        Arc::new(StaticCredentials::none()),
        5,
    );

    orch.mount_share(&data_share()).unwrap();

    // Too small a bound gives up while the job keeps running
    assert!(orch.wait_idle_for(Duration::from_millis(10)).await.is_err());
    assert!(orch.has_jobs_in_flight());

    // A bound that covers the helper invocation sees it through
    orch.wait_idle_for(Duration::from_secs(5)).await.unwrap();
    assert!(!orch.has_jobs_in_flight());
    let record = orch
        .shares()
        .into_iter()
        .find(|r| r.id.share == "data")
        .unwrap();
    assert_eq!(record.state, MountState::Mounted);
}

#[tokio::test]
async fn test_mount_all_seeds_from_stored_settings() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    let mut store = MemorySettingsStore::new();
    store.upsert(data_key(), CustomSettings::default()).unwrap();
    // Host-level entries name no share and contribute no candidate
    store
        .upsert(
            SettingsKey::for_host("WG", "server2"),
            CustomSettings::default(),
        )
        .unwrap();
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        store,
        Arc::new(StaticCredentials::none()),
        5,
    );

    // Fresh start: nothing observed yet, the registry is empty
    assert!(orch.shares().is_empty());
    let failures = orch.mount_all();
    assert!(failures.is_empty());
    orch.wait_idle().await.unwrap();

    assert_eq!(helper.mount_calls(), 1);
    let record = orch
        .shares()
        .into_iter()
        .find(|r| r.id.share == "data")
        .unwrap();
    assert_eq!(record.state, MountState::Mounted);
}

#[tokio::test]
async fn test_homes_share_requires_login() {
    let temp = TempDir::new().unwrap();
    let helper = Arc::new(MockMountHelper::new());
    let mut orch = orchestrator(
        temp.path(),
        Arc::clone(&helper),
        MemorySettingsStore::new(),
        Arc::new(StaticCredentials::none()),
        5,
    );

    let homes = ShareId::new("WG", "server", "homes");
    let err = orch.mount_share(&homes).unwrap_err();
    assert!(matches!(err, SharekeeperError::MissingLoginName { .. }));
    assert_eq!(helper.mount_calls(), 0);

    orch.mount_share(&homes.with_login("alice")).unwrap();
    orch.wait_idle().await.unwrap();
    assert_eq!(helper.mount_calls(), 1);
}
