//! GameBanana client against a local mock portal.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use modsync_core::network::{HttpClient, RetryConfig, TransferProgress};
use modsync_core::{
    BrowseFilters, GameBananaClient, ModSync, ModSyncError, Section, SyncPhase, UpstreamClient,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct Portal {
    /// Subfeed requests answered with an empty body before real data.
    empty_bodies: Arc<AtomicUsize>,
    subfeed_hits: Arc<AtomicUsize>,
    detail_hits: Arc<AtomicUsize>,
}

async fn subfeed(State(portal): State<Portal>) -> impl IntoResponse {
    portal.subfeed_hits.fetch_add(1, Ordering::SeqCst);
    let remaining = portal.empty_bodies.load(Ordering::SeqCst);
    if remaining > 0 {
        portal.empty_bodies.fetch_sub(1, Ordering::SeqCst);
        return String::new();
    }
    json!({
        "_aMetadata": {"_nRecordCount": 47, "_bIsComplete": false, "_nPerpage": 15},
        "_aRecords": [
            {"_idRow": 11, "_sName": "Blue Haze", "_sModelName": "Mod", "_tsDateAdded": 100,
             "_aRootCategory": {"_idRow": 5, "_sName": "Skins"}},
            {"_idRow": 12, "_sName": "Loud Gun", "_sModelName": "Sound", "_tsDateAdded": 101},
            {"_idRow": 13, "_sName": "Red Haze", "_sModelName": "Mod", "_tsDateAdded": 102,
             "_aRootCategory": {"_idRow": 5, "_sName": "Skins"}}
        ]
    })
    .to_string()
}

async fn profile_page(
    State(portal): State<Portal>,
    Path(id): Path<u64>,
) -> axum::response::Response {
    portal.detail_hits.fetch_add(1, Ordering::SeqCst);
    if id != 11 {
        return StatusCode::NOT_FOUND.into_response();
    }
    json!({
        "_idRow": 11,
        "_sName": "Blue Haze",
        "_sText": "A hazy skin",
        "_bIsNsfw": true,
        "_aCategory": {"_idRow": 5, "_sName": "Skins"},
        "_aFiles": [
            {"_idRow": 110, "_sFile": "haze.zip", "_nFilesize": 12, "_nDownloadCount": 3},
            {"_idRow": 111, "_sFile": "haze_alt.zip", "_nFilesize": 12, "_nDownloadCount": 30}
        ]
    })
    .to_string()
    .into_response()
}

async fn broken_categories() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "")
}

async fn section_list(Path(game): Path<u64>) -> axum::response::Response {
    if game != 20948 {
        return StatusCode::NOT_FOUND.into_response();
    }
    json!([
        {"_sPluralTitle": "Mods", "_sModelName": "Mod", "_sCategoryModelName": "ModCategory", "_nItemCount": 5120},
        {"_sPluralTitle": "Sounds", "_sModelName": "Sound", "_sCategoryModelName": "SoundCategory", "_nItemCount": 310},
        {"_sPluralTitle": "Sprays", "_sModelName": "Spray", "_sCategoryModelName": "SprayCategory", "_nItemCount": 12}
    ])
    .to_string()
    .into_response()
}

async fn file_payload(Path(id): Path<u64>) -> impl IntoResponse {
    format!("payload-{}", id)
}

async fn start_portal(portal: Portal) -> String {
    let app = Router::new()
        .route("/apiv11/Game/:game/Subfeed", get(subfeed))
        .route("/apiv11/Mod/:id/ProfilePage", get(profile_page))
        .route("/apiv11/Util/:model/NestedStructure", get(broken_categories))
        .route("/apiv11/Game/:game/CategoryTree", get(section_list))
        .route("/dl/:id", get(file_payload))
        .with_state(portal);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A subfeed that serves `pages[n - 1]` for `_nPage=n` and an empty body past
/// the end.
#[derive(Clone)]
struct PagedFeed {
    pages: Arc<Vec<Value>>,
    hits: Arc<AtomicUsize>,
}

async fn paged_subfeed(
    State(feed): State<PagedFeed>,
    Query(query): Query<HashMap<String, String>>,
) -> String {
    feed.hits.fetch_add(1, Ordering::SeqCst);
    let page: usize = query
        .get("_nPage")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
    feed.pages
        .get(page - 1)
        .map(Value::to_string)
        .unwrap_or_default()
}

async fn start_paged_feed(pages: Vec<Value>) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let feed = PagedFeed {
        pages: Arc::new(pages),
        hits: hits.clone(),
    };
    let app = Router::new()
        .route("/apiv11/Game/:game/Subfeed", get(paged_subfeed))
        .with_state(feed);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), hits)
}

fn feed_record(id: u64, model: &str) -> Value {
    json!({"_idRow": id, "_sName": format!("{} {}", model, id), "_sModelName": model,
           "_tsDateAdded": 100 + id})
}

async fn create_test_engine(temp_dir: &TempDir, base: &str) -> ModSync {
    ModSync::builder(temp_dir.path().join("data"))
        .auto_create_dirs(true)
        .upstream(Arc::new(create_test_client(base)))
        .build()
        .await
        .unwrap()
}

fn create_test_client(base: &str) -> GameBananaClient {
    GameBananaClient::with_http_client(HttpClient::new().unwrap().with_pacing(None))
        .with_api_base(format!("{}/apiv11", base))
        .with_retry(
            RetryConfig::new()
                .with_max_attempts(3)
                .with_base_delay(Duration::from_millis(10))
                .with_jitter(false),
        )
}

#[tokio::test]
async fn test_empty_bodies_are_retried_not_returned() {
    let portal = Portal::default();
    portal.empty_bodies.store(2, Ordering::SeqCst);
    let base = start_portal(portal.clone()).await;
    let client = create_test_client(&base);

    let page = client
        .browse(Section::Mod, 1, 50, &BrowseFilters::default())
        .await
        .unwrap();

    assert_eq!(portal.subfeed_hits.load(Ordering::SeqCst), 3);
    assert_eq!(page.per_page, 15);
    assert_eq!(page.total_count, 47);
    assert!(!page.is_complete);
    let ids: Vec<u64> = page.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![11, 13]);
}

#[tokio::test]
async fn test_persistent_empty_bodies_become_unavailable() {
    let portal = Portal::default();
    portal.empty_bodies.store(usize::MAX / 2, Ordering::SeqCst);
    let base = start_portal(portal.clone()).await;
    let client = create_test_client(&base);

    let err = client
        .browse(Section::Mod, 1, 50, &BrowseFilters::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ModSyncError::UpstreamUnavailable { attempts: 3, .. }));
    assert_eq!(portal.subfeed_hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_detail_is_parsed_and_memoised() {
    let portal = Portal::default();
    let base = start_portal(portal.clone()).await;
    let client = create_test_client(&base);

    let detail = client.fetch_detail(Section::Mod, 11).await.unwrap();
    assert!(detail.nsfw);
    assert_eq!(detail.download_count, 33);
    assert_eq!(detail.description.as_deref(), Some("A hazy skin"));
    assert_eq!(detail.primary_file().map(|f| f.id), Some(111));

    client.fetch_detail(Section::Mod, 11).await.unwrap();
    assert_eq!(portal.detail_hits.load(Ordering::SeqCst), 1);

    // 404 is permanent: one request, no retries
    let missing = client.fetch_detail(Section::Mod, 99).await.unwrap_err();
    assert!(matches!(missing, ModSyncError::ModNotFound { .. }));
    assert_eq!(portal.detail_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_categories_fall_back_to_observed_records() {
    let portal = Portal::default();
    let base = start_portal(portal).await;
    let client = create_test_client(&base);

    let empty = client.list_categories(Section::Mod).await.unwrap();
    assert!(empty.nodes.is_empty());
    assert!(!empty.canonical);

    client
        .browse(Section::Mod, 1, 50, &BrowseFilters::default())
        .await
        .unwrap();
    let tree = client.list_categories(Section::Mod).await.unwrap();
    assert!(!tree.canonical);
    assert_eq!(tree.nodes.len(), 1);
    assert_eq!(tree.nodes[0].name, "Skins");
    assert_eq!(tree.nodes[0].item_count, 2);
}

#[tokio::test]
async fn test_sections_come_from_game_category_tree() {
    let base = start_portal(Portal::default()).await;
    let temp_dir = TempDir::new().unwrap();
    let engine = create_test_engine(&temp_dir, &base).await;

    let sections = engine.list_sections().await.unwrap();
    let titles: Vec<&str> = sections.iter().map(|s| s.plural_title.as_str()).collect();
    assert_eq!(titles, vec!["Mods", "Sounds", "Sprays"]);
    assert_eq!(sections[1].section, Some(Section::Sound));
    assert_eq!(sections[1].item_count, 310);
    assert_eq!(sections[2].section, None);

    let other_game = create_test_client(&base).with_game_id(1);
    assert!(matches!(
        other_game.list_sections().await,
        Err(ModSyncError::UpstreamStatus { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_file_download_streams_to_disk() {
    let portal = Portal::default();
    let base = start_portal(portal).await;
    let client = create_test_client(&base);
    let temp_dir = TempDir::new().unwrap();
    let destination = temp_dir.path().join("nested/haze.zip");

    let file = modsync_core::ModFile {
        id: 110,
        file_name: "haze.zip".to_string(),
        file_size: 11,
        download_url: format!("{}/dl/110", base),
        download_count: 3,
        description: None,
    };
    let (tx, mut rx) = mpsc::channel::<TransferProgress>(16);
    let bytes = client.download_file(&file, &destination, tx).await.unwrap();

    assert_eq!(bytes, 11);
    assert_eq!(std::fs::read(&destination).unwrap(), b"payload-110");
    let mut last = None;
    while let Some(progress) = rx.recv().await {
        last = Some(progress);
    }
    assert_eq!(last.map(|p| p.downloaded), Some(11));
}

#[tokio::test]
async fn test_page_of_other_section_records_does_not_end_sync() {
    let (base, hits) = start_paged_feed(vec![
        json!({
            "_aMetadata": {"_nRecordCount": 4, "_bIsComplete": false, "_nPerpage": 2},
            "_aRecords": [feed_record(21, "Sound"), feed_record(22, "Sound")]
        }),
        json!({
            "_aMetadata": {"_nRecordCount": 4, "_bIsComplete": true, "_nPerpage": 2},
            "_aRecords": [feed_record(23, "Mod"), feed_record(24, "Mod")]
        }),
    ])
    .await;
    let temp_dir = TempDir::new().unwrap();
    let engine = create_test_engine(&temp_dir, &base).await;

    engine.sync_section(Section::Mod).await;

    let state = engine.sync_state(Section::Mod);
    assert_eq!(state.phase, SyncPhase::Complete);
    assert_eq!(state.current_page, 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(engine.local_mod_count(Some(Section::Mod)).unwrap(), 2);
    assert!(engine.get_cached_mod(Section::Mod, 24).unwrap().is_some());
}

#[tokio::test]
async fn test_empty_body_mid_sync_keeps_earlier_pages() {
    let (base, hits) = start_paged_feed(vec![json!({
        "_aMetadata": {"_nRecordCount": 6, "_bIsComplete": false, "_nPerpage": 2},
        "_aRecords": [feed_record(31, "Mod"), feed_record(32, "Mod")]
    })])
    .await;
    let temp_dir = TempDir::new().unwrap();
    let engine = create_test_engine(&temp_dir, &base).await;

    engine.sync_section(Section::Mod).await;

    let state = engine.sync_state(Section::Mod);
    assert_eq!(state.phase, SyncPhase::Error);
    assert!(state.error.is_some());
    assert_eq!(state.current_page, 1);
    // page 1 once, then page 2 until retries run out
    assert_eq!(hits.load(Ordering::SeqCst), 4);

    assert_eq!(engine.local_mod_count(Some(Section::Mod)).unwrap(), 2);
    let found = engine
        .search_local_mods(modsync_core::CatalogQuery {
            text: Some("Mod 31".to_string()),
            ..modsync_core::CatalogQuery::section(Section::Mod)
        })
        .unwrap();
    assert_eq!(found.total_count, 1);
}
