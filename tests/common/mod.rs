#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use manga_tracker::core::config::FetchConfig;
use manga_tracker::core::model::{Pagination, TrackedSite};
use manga_tracker::engine::FetchPipeline;
use manga_tracker::network::HttpService;
use manga_tracker::store::{SnapshotCache, Store};
use tokio::net::TcpListener;

/// 在随机端口上启动路由，返回监听地址
pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub fn site(id: &str, label: &str, url: String) -> TrackedSite {
    TrackedSite {
        id: id.to_string(),
        label: label.to_string(),
        url,
        pagination: Pagination::Unpaginated,
        series_url_template: None,
        chapter_url_template: None,
        cookies: Vec::new(),
        reauthenticated_at: None,
    }
}

pub fn pipeline() -> FetchPipeline {
    let http = HttpService::new(&FetchConfig::default()).unwrap();
    FetchPipeline::new(http, Arc::new(SnapshotCache::new()))
}

/// 与存储共享快照缓存的抓取管线
pub fn pipeline_for(store: &Store) -> FetchPipeline {
    let http = HttpService::new(&FetchConfig::default()).unwrap();
    FetchPipeline::new(http, store.snapshots())
}
