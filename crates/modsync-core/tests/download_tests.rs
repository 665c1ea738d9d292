//! Download queue, install pipeline and conflict reporting end to end.

mod common;

use common::{
    create_test_detail, create_test_engine, create_test_vpk, create_test_zip, ScriptedUpstream,
};
use modsync_core::{
    ConflictKind, DownloadFailureKind, DownloadRequest, EngineEvent, ModSync, ModSyncError,
    Placement,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, Semaphore};

fn request(mod_id: u64) -> DownloadRequest {
    DownloadRequest {
        mod_id,
        file_id: None,
        file_name: None,
        section: None,
        category_id: None,
    }
}

const SHARED_ASSET: &str = "materials/heroes/haze/body.vmat_c";

/// Upstream serving one zip per mod, each holding `entry` as a package that
/// lists `assets`.
fn upstream_with_mods(
    ids: &[u64],
    entry: &str,
    assets: &[&str],
    gate: Option<Arc<Semaphore>>,
) -> ScriptedUpstream {
    let upstream = ScriptedUpstream {
        download_gate: gate,
        ..ScriptedUpstream::default()
    };
    for &id in ids {
        let file_id = id * 10;
        upstream.add_detail(create_test_detail(
            modsync_core::Section::Mod,
            id,
            &[(file_id, &format!("mod{}.zip", id))],
        ));
        upstream.add_payload(file_id, create_test_zip(&[(entry, create_test_vpk(assets).as_slice())]));
    }
    upstream
}

async fn next_event(rx: &mut broadcast::Receiver<EngineEvent>) -> EngineEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for an event")
            .unwrap();
        if !matches!(event, EngineEvent::SyncProgress(_)) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_queue_runs_one_at_a_time_and_cancels_waiting_items() {
    let temp_dir = TempDir::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let upstream = Arc::new(upstream_with_mods(
        &[1, 2, 3],
        "pak01_dir.vpk",
        &[SHARED_ASSET],
        Some(gate.clone()),
    ));
    let engine = create_test_engine(&temp_dir, upstream, true).await;

    let x = engine.download_mod(request(1)).unwrap();
    let y = engine.download_mod(request(2)).unwrap();
    let z = engine.download_mod(request(3)).unwrap();
    assert_eq!(x.placement(), Placement::Started);
    assert_eq!(y.placement(), Placement::Queued(0));
    assert_eq!(z.placement(), Placement::Queued(1));

    assert_eq!(engine.current_download().unwrap().unwrap().item.mod_id, 1);
    let waiting: Vec<u64> = engine
        .download_queue()
        .unwrap()
        .iter()
        .map(|i| i.mod_id)
        .collect();
    assert_eq!(waiting, vec![2, 3]);

    // a second request for a queued mod is rejected
    assert!(engine.download_mod(request(3)).is_err());

    assert!(engine.remove_from_queue(2, None).unwrap());
    assert!(!engine.remove_from_queue(1, None).unwrap());
    assert!(!engine.remove_from_queue(42, None).unwrap());
    assert!(matches!(y.wait().await, Err(ModSyncError::DownloadCancelled)));

    gate.add_permits(2);
    let first = x.wait().await.unwrap();
    let third = z.wait().await.unwrap();
    assert_eq!(first.file_id, 10);
    assert_eq!(third.file_id, 30);
    assert_eq!(first.installed[0].priority, 1);
    assert_eq!(third.installed[0].priority, 2);

    assert!(engine.current_download().unwrap().is_none());
    assert!(engine.download_queue().unwrap().is_empty());
    let installed: Vec<u64> = engine
        .installed_mods()
        .unwrap()
        .iter()
        .filter_map(|m| m.origin.as_ref().map(|o| o.mod_id))
        .collect();
    assert_eq!(installed.len(), 2);
    assert!(!installed.contains(&2));
}

#[tokio::test]
async fn test_lifecycle_events_arrive_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let upstream = Arc::new(upstream_with_mods(&[7], "skin_dir.vpk", &[SHARED_ASSET], None));
    let engine = create_test_engine(&temp_dir, upstream, true).await;
    let mut events = engine.subscribe_events();

    let ticket = engine.download_mod(request(7)).unwrap();
    let outcome = ticket.wait().await.unwrap();

    let mut names = Vec::new();
    loop {
        let event = next_event(&mut events).await;
        let done = matches!(event, EngineEvent::DownloadComplete(_));
        names.push(event.name());
        if let EngineEvent::DownloadComplete(complete) = &event {
            assert_eq!(complete.mod_id, 7);
            assert_eq!(complete.file_id, 70);
            assert_eq!(complete.installed_files, vec!["pak50_dir.vpk".to_string()]);
        }
        if done {
            break;
        }
    }

    let extracting = names.iter().position(|n| *n == "downloadExtracting").unwrap();
    assert!(extracting > 0);
    assert!(names[..extracting].iter().all(|n| *n == "downloadProgress"));
    assert_eq!(names.last(), Some(&"downloadComplete"));

    let installed = &outcome.installed[0];
    assert!(installed.path.exists());
    assert_eq!(installed.content_paths, vec![SHARED_ASSET.to_string()]);
    assert_eq!(installed.name, "Mod 7");

    // staging area is cleaned up
    let staging = temp_dir.path().join("data/downloads/7");
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_failed_item_reports_and_queue_moves_on() {
    let temp_dir = TempDir::new().unwrap();
    let upstream = Arc::new(upstream_with_mods(&[6], "pak01_dir.vpk", &[SHARED_ASSET], None));
    upstream.add_detail(create_test_detail(
        modsync_core::Section::Mod,
        5,
        &[(50, "mod.exe")],
    ));
    let engine = create_test_engine(&temp_dir, upstream, true).await;
    let mut events = engine.subscribe_events();

    let bad = engine.download_mod(request(5)).unwrap();
    let good = engine.download_mod(request(6)).unwrap();
    assert_eq!(good.placement(), Placement::Queued(0));

    match bad.wait().await {
        Err(ModSyncError::DownloadFailed {
            mod_id,
            file_id,
            kind,
            ..
        }) => {
            assert_eq!(mod_id, 5);
            assert_eq!(file_id, None);
            assert_eq!(kind, DownloadFailureKind::ArchiveFormat);
        }
        other => panic!("expected a failed download, got {:?}", other),
    }
    assert!(good.wait().await.is_ok());

    match next_event(&mut events).await {
        EngineEvent::DownloadFailed(failed) => {
            assert_eq!(failed.mod_id, 5);
            assert_eq!(failed.kind, DownloadFailureKind::ArchiveFormat);
            assert!(!failed.error.is_empty());
        }
        other => panic!("expected downloadFailed first, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_mod_fails_as_file_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let upstream = Arc::new(ScriptedUpstream::default());
    let engine = create_test_engine(&temp_dir, upstream, true).await;

    let ticket = engine.download_mod(request(404)).unwrap();
    match ticket.wait().await {
        Err(ModSyncError::DownloadFailed { kind, .. }) => {
            assert_eq!(kind, DownloadFailureKind::FileNotFound)
        }
        other => panic!("expected a failed download, got {:?}", other),
    }
    assert!(engine.current_download().unwrap().is_none());
}

#[tokio::test]
async fn test_downloads_need_a_game_install() {
    let temp_dir = TempDir::new().unwrap();
    let engine: ModSync =
        create_test_engine(&temp_dir, Arc::new(ScriptedUpstream::default()), false).await;

    assert!(matches!(
        engine.download_mod(request(1)),
        Err(ModSyncError::Config { .. })
    ));
    assert!(engine.installed_mods().is_err());
}

#[tokio::test]
async fn test_shared_content_is_reported_as_conflict() {
    let temp_dir = TempDir::new().unwrap();
    let upstream = Arc::new(upstream_with_mods(&[1, 2], "pak01_dir.vpk", &[SHARED_ASSET], None));
    let engine = create_test_engine(&temp_dir, upstream, true).await;

    let first = engine.download_mod(request(1)).unwrap();
    let second = engine.download_mod(request(2)).unwrap();
    let a = first.wait().await.unwrap().installed.remove(0);
    let b = second.wait().await.unwrap().installed.remove(0);

    let conflicts = engine.conflicts().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::SameFile);
    assert_eq!(conflicts[0].detail, format!("both provide {}", SHARED_ASSET));
    let mut pair = [a.id.clone(), b.id.clone()];
    pair.sort();
    assert_eq!([conflicts[0].mod_a.clone(), conflicts[0].mod_b.clone()], pair);

    let order: Vec<String> = engine.load_order().unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(order, vec![a.id.clone(), b.id.clone()]);

    // disabling one side clears the conflict
    engine.disable_mod(&b.id).unwrap();
    assert!(engine.conflicts().unwrap().is_empty());
    let enabled = engine.enable_mod(&b.id).unwrap();
    assert_eq!(enabled.id, b.id);
    assert_eq!(engine.conflicts().unwrap().len(), 1);

    engine.uninstall_mod(&a.id).unwrap();
    assert!(engine.conflicts().unwrap().is_empty());
    assert_eq!(engine.installed_mods().unwrap().len(), 1);
}

#[tokio::test]
async fn test_priority_changes_reorder_and_reject_taken_slots() {
    let temp_dir = TempDir::new().unwrap();
    let upstream = Arc::new(upstream_with_mods(&[1, 2], "pak03_dir.vpk", &[SHARED_ASSET], None));
    let engine = create_test_engine(&temp_dir, upstream, true).await;

    let a = engine.download_mod(request(1)).unwrap();
    let b = engine.download_mod(request(2)).unwrap();
    let a = a.wait().await.unwrap().installed.remove(0);
    let b = b.wait().await.unwrap().installed.remove(0);
    assert_eq!((a.priority, b.priority), (3, 4));

    assert!(matches!(
        engine.set_mod_priority(&b.id, 3),
        Err(ModSyncError::PriorityInUse { priority: 3 })
    ));
    let moved = engine.set_mod_priority(&b.id, 1).unwrap();
    assert_eq!(moved.file_name, "pak01_dir.vpk");
    assert_eq!(moved.id, b.id);

    let order: Vec<u32> = engine.load_order().unwrap().iter().map(|m| m.priority).collect();
    assert_eq!(order, vec![1, 3]);
}

#[tokio::test]
async fn test_same_file_name_with_different_assets_does_not_conflict() {
    let temp_dir = TempDir::new().unwrap();
    let upstream = Arc::new(upstream_with_mods(
        &[3],
        "pak01_dir.vpk",
        &["materials/heroes/wraith/body.vmat_c"],
        None,
    ));
    let engine = create_test_engine(&temp_dir, upstream, true).await;
    let addons = temp_dir.path().join("Deadlock/game/citadel/addons");
    std::fs::write(addons.join("pak01_dir.vpk"), create_test_vpk(&[SHARED_ASSET])).unwrap();

    let installed = engine
        .download_mod(request(3))
        .unwrap()
        .wait()
        .await
        .unwrap()
        .installed
        .remove(0);
    assert_eq!(installed.file_name, "pak02_dir.vpk");
    assert_eq!(
        installed.content_paths,
        vec!["materials/heroes/wraith/body.vmat_c".to_string()]
    );
    assert!(engine.conflicts().unwrap().is_empty());
}
