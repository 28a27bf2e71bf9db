mod common;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Html;
use axum::routing::get;
use manga_tracker::core::model::{Pagination, StoredCookie, TrackedSeries, TrackedSite};
use manga_tracker::engine::{PAGE_SEPARATOR, Poller};
use manga_tracker::matching::run_matches;
use manga_tracker::store::{NewSite, SiteUpdate, Store};

use common::{pipeline, pipeline_for, site, spawn_router};

const ALPHA_PAGE: &str = r#"<html><body>
<div><a href="/a/frieren/140">Frieren: Beyond Journey&#39;s End Chapter 140</a></div>
<div><a href="/a/frieren/139">Frieren: Beyond Journey's End Chapter 139</a></div>
<div><a href="/a/meshi/97">Dungeon Meshi Chapter 97</a></div>
</body></html>"#;

const BETA_PAGE: &str = r#"<html><body>
<div><a href="/b/frieren-139">Frieren: Beyond Journey's End Ch. 139</a></div>
</body></html>"#;

async fn paged(Query(params): Query<HashMap<String, String>>, headers: HeaderMap) -> Result<String, StatusCode> {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    match params.get("page").map(String::as_str) {
        Some("1") => Ok(format!("page one [{}]", cookie)),
        Some("2") => Err(StatusCode::INTERNAL_SERVER_ERROR),
        Some("3") => Ok(format!("page three [{}]", cookie)),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

#[tokio::test]
async fn same_series_on_two_sites_orders_by_latest_chapter() {
    let router = Router::new()
        .route("/a", get(|| async { Html(ALPHA_PAGE) }))
        .route("/b", get(|| async { Html(BETA_PAGE) }));
    let addr = spawn_router(router).await;

    let sites = vec![
        site("beta", "Beta Scans", format!("http://127.0.0.1:{}/b", addr.port())),
        site("alpha", "Alpha Reader", format!("http://127.0.0.1:{}/a", addr.port())),
    ];
    let series = vec![TrackedSeries {
        id: "frieren".into(),
        title: "Frieren: Beyond Journey's End".into(),
        aliases: vec!["Sousou no Frieren".into()],
        site_names: HashMap::new(),
    }];

    let pipeline = pipeline();
    let summary = pipeline.refresh(&sites).await;
    assert_eq!(summary.cached, 2);

    let report = run_matches(&sites, &series, pipeline.cache());
    assert!(!report.from_fallback);
    assert!(report.missing_cache.is_empty());
    assert_eq!(report.matches.len(), 1);

    let sources = &report.matches[0].sources;
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].site, "Alpha Reader");
    assert_eq!(sources[0].latest_chapter.as_deref(), Some("140"));
    assert_eq!(sources[0].latest_chapter_number, Some(140.0));
    assert_eq!(
        sources[0].link.as_deref(),
        Some(format!("http://127.0.0.1:{}/a/frieren/140", addr.port()).as_str())
    );
    let labels: Vec<_> = sources[0].chapters.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["140", "139"]);

    assert_eq!(sources[1].site, "Beta Scans");
    assert_eq!(sources[1].latest_chapter_number, Some(139.0));
}

#[tokio::test]
async fn failed_pages_are_skipped_and_cookies_are_sent() {
    let addr = spawn_router(Router::new().route("/list", get(paged))).await;

    let mut target = site("paged", "Paged", format!("http://127.0.0.1:{}/list", addr.port()));
    target.pagination = Pagination::Query {
        parameter: "page".into(),
        start: 1,
        pages: 3,
    };
    target.cookies = vec![StoredCookie {
        name: "session".into(),
        value: "abc".into(),
        domain: "127.0.0.1".into(),
        path: "/".into(),
        secure: false,
        http_only: true,
        expires: None,
    }];

    let body = pipeline().fetch_site(&target).await;
    assert_eq!(
        body,
        format!("page one [session=abc]{}page three [session=abc]", PAGE_SEPARATOR)
    );
}

#[tokio::test]
async fn unreachable_site_purges_its_snapshot() {
    let addr = spawn_router(Router::new().route("/gone", get(|| async { StatusCode::NOT_FOUND }))).await;
    let target = site("gone", "Gone", format!("http://127.0.0.1:{}/gone", addr.port()));

    let pipeline = pipeline();
    pipeline.cache().record("gone", "stale".into(), chrono::Utc::now());

    let summary = pipeline.refresh(std::slice::from_ref(&target)).await;
    assert_eq!(summary.purged, 1);
    assert!(!pipeline.cache().contains("gone"));
}

async fn slow_page() -> Html<&'static str> {
    tokio::time::sleep(Duration::from_millis(500)).await;
    Html(ALPHA_PAGE)
}

async fn store_with_slow_site() -> (tempfile::TempDir, Arc<Store>, TrackedSite, SocketAddr) {
    let addr = spawn_router(Router::new().route("/slow", get(slow_page))).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path()).await.unwrap());
    let site = store
        .add_site(NewSite {
            label: "Slow".into(),
            url: format!("http://127.0.0.1:{}/slow", addr.port()),
            ..Default::default()
        })
        .await
        .unwrap();
    (dir, store, site, addr)
}

#[tokio::test]
async fn url_change_during_fetch_discards_old_body() {
    let (_dir, store, target, addr) = store_with_slow_site().await;
    let pipeline = Arc::new(pipeline_for(&store));

    let refresh = {
        let pipeline = pipeline.clone();
        let target = target.clone();
        tokio::spawn(async move { pipeline.refresh(std::slice::from_ref(&target)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    store
        .update_site(
            &target.id,
            SiteUpdate {
                url: Some(format!("http://127.0.0.1:{}/slow?v=2", addr.port())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let summary = refresh.await.unwrap();
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.cached, 0);
    assert!(store.snapshots().get(&target.id).is_none());
}

#[tokio::test]
async fn removal_during_fetch_discards_body() {
    let (_dir, store, target, _) = store_with_slow_site().await;
    let pipeline = Arc::new(pipeline_for(&store));

    let refresh = {
        let pipeline = pipeline.clone();
        let target = target.clone();
        tokio::spawn(async move { pipeline.refresh(std::slice::from_ref(&target)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    store.remove_site(&target.id).await.unwrap();

    let summary = refresh.await.unwrap();
    assert_eq!(summary.stale, 1);
    assert!(!store.snapshots().contains(&target.id));
}

#[tokio::test]
async fn poller_tick_fills_the_cache() {
    let (_dir, store, target, _) = store_with_slow_site().await;
    let pipeline = Arc::new(pipeline_for(&store));

    let poller = Poller::start(store.clone(), pipeline, Duration::from_millis(50));
    let cached = tokio::time::timeout(Duration::from_secs(5), async {
        while !store.snapshots().contains(&target.id) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    poller.stop(Duration::from_secs(2)).await;

    assert!(cached.is_ok());
    let snapshot = store.snapshots().get(&target.id).unwrap();
    assert!(snapshot.body.contains("Dungeon Meshi Chapter 97"));
}
