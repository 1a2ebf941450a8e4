use pretty_assertions::assert_eq;
use recall_state::{
    Alert, EnforcementState, ProjectState, ProjectStateStore, StateError, StateStoreConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn store_with_debounce(home: &TempDir, debounce_ms: u64) -> ProjectStateStore {
    let _ = env_logger::builder().is_test(true).try_init();
    ProjectStateStore::new(
        StateStoreConfig::new(home.path()).with_debounce(Duration::from_millis(debounce_ms)),
    )
}

fn read_state(store: &ProjectStateStore, project_id: &str) -> ProjectState {
    let path = store
        .home()
        .join("projects")
        .join(project_id)
        .join("state.json");
    let bytes = std::fs::read(path).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn get_creates_and_persists_fresh_state() {
    let home = TempDir::new().unwrap();
    let workdir = TempDir::new().unwrap();
    let store = store_with_debounce(&home, 50);

    let state = store.get(workdir.path()).await.unwrap();
    assert_eq!(state.phase, "discovery");
    assert_eq!(state.project_id.len(), 16);

    // Fresh state is persisted immediately, enforcement projection included.
    let on_disk = read_state(&store, &state.project_id);
    assert_eq!(on_disk.project_id, state.project_id);

    let enforcement_path = home
        .path()
        .join("projects")
        .join(&state.project_id)
        .join("enforcement-state.json");
    let projection: EnforcementState =
        serde_json::from_slice(&std::fs::read(enforcement_path).unwrap()).unwrap();
    assert!(!projection.has_scope);
    assert_eq!(projection.project_id, state.project_id);
}

#[tokio::test]
async fn get_returns_cached_then_reloads_from_disk() {
    let home = TempDir::new().unwrap();
    let workdir = TempDir::new().unwrap();
    let store = store_with_debounce(&home, 50);

    let first = store.get(workdir.path()).await.unwrap();
    let second = store.get(workdir.path()).await.unwrap();
    assert_eq!(first.project_id, second.project_id);
    assert_eq!(first.created_at_ms, second.created_at_ms);

    // A brand-new store (cold cache) must load the same persisted state.
    let cold = store_with_debounce(&home, 50);
    let reloaded = cold.get(workdir.path()).await.unwrap();
    assert_eq!(reloaded.created_at_ms, first.created_at_ms);
}

#[tokio::test]
async fn debounced_saves_coalesce_into_one_write_with_last_value() {
    let home = TempDir::new().unwrap();
    let workdir = TempDir::new().unwrap();
    let store = store_with_debounce(&home, 100);

    let mut state = store.get(workdir.path()).await.unwrap();
    let id = state.project_id.clone();

    state.phase = "first".into();
    store.save(state.clone(), false).await.unwrap();
    state.phase = "second".into();
    store.save(state.clone(), false).await.unwrap();

    // Before the debounce delay elapses the on-disk copy still reflects the
    // state prior to both saves, while the cached value is the second save.
    assert_eq!(read_state(&store, &id).phase, "discovery");
    assert_eq!(store.get(workdir.path()).await.unwrap().phase, "second");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(read_state(&store, &id).phase, "second");
    assert_eq!(store.dirty_count(), 0);
}

#[tokio::test]
async fn flush_cancels_timer_and_writes_now() {
    let home = TempDir::new().unwrap();
    let workdir = TempDir::new().unwrap();
    let store = store_with_debounce(&home, 60_000);

    let mut state = store.get(workdir.path()).await.unwrap();
    let id = state.project_id.clone();
    state.phase = "build".into();
    state.verification_runs = 3;
    store.save(state, false).await.unwrap();

    store.flush().await.unwrap();
    let on_disk = read_state(&store, &id);
    assert_eq!(on_disk.phase, "build");
    assert_eq!(on_disk.verification_runs, 3);
    assert_eq!(store.dirty_count(), 0);
}

#[tokio::test]
async fn flush_partial_failure_keeps_failed_project_dirty() {
    let home = TempDir::new().unwrap();
    let store = store_with_debounce(&home, 60_000);

    let good = ProjectState::new(
        "aaaaaaaaaaaaaaaa".into(),
        "good".into(),
        PathBuf::from("/tmp/good"),
    );
    let bad = ProjectState::new(
        "bbbbbbbbbbbbbbbb".into(),
        "bad".into(),
        PathBuf::from("/tmp/bad"),
    );

    // Make the bad project's state path unwritable: a directory where the
    // file should land defeats the rename.
    let obstruction = home
        .path()
        .join("projects")
        .join("bbbbbbbbbbbbbbbb")
        .join("state.json");
    std::fs::create_dir_all(&obstruction).unwrap();

    store.save(good, false).await.unwrap();
    store.save(bad.clone(), false).await.unwrap();

    let err = store.flush().await.unwrap_err();
    match &err {
        StateError::FlushFailed { failed } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, "bbbbbbbbbbbbbbbb");
        }
        other => panic!("unexpected error: {other}"),
    }

    // The good project was written and is no longer dirty.
    assert_eq!(read_state(&store, "aaaaaaaaaaaaaaaa").project_name, "good");
    assert_eq!(store.dirty_count(), 1);

    // Clear the obstruction; the next flush retries only the failed project.
    std::fs::remove_dir_all(&obstruction).unwrap();
    store.flush().await.unwrap();
    assert_eq!(read_state(&store, "bbbbbbbbbbbbbbbb").project_name, "bad");
    assert_eq!(store.dirty_count(), 0);
}

#[tokio::test]
async fn enforcement_projection_follows_every_durable_write() {
    let home = TempDir::new().unwrap();
    let workdir = TempDir::new().unwrap();
    let store = store_with_debounce(&home, 50);

    let mut state = store.get(workdir.path()).await.unwrap();
    state.scope = Some("add billing".into());
    state.alerts.push(Alert {
        msg: "stop: schema unchecked".into(),
        blocking: true,
        ack: false,
    });
    store.save(state.clone(), true).await.unwrap();

    let path = home
        .path()
        .join("projects")
        .join(&state.project_id)
        .join("enforcement-state.json");
    let projection: EnforcementState =
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert!(projection.has_scope);
    assert_eq!(projection.blocking_alerts, vec!["stop: schema unchecked"]);
}

#[tokio::test]
async fn list_skips_corrupt_state_files() {
    let home = TempDir::new().unwrap();
    let workdir = TempDir::new().unwrap();
    let store = store_with_debounce(&home, 50);

    let state = store.get(workdir.path()).await.unwrap();

    let corrupt_dir = home.path().join("projects").join("cccccccccccccccc");
    std::fs::create_dir_all(&corrupt_dir).unwrap();
    std::fs::write(corrupt_dir.join("state.json"), b"{ not json").unwrap();

    let listed = store.list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, state.project_id);
}
