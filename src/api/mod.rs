//! HTTP 接口 (HTTP API)
//!
//! 基于 axum 的 REST 接口：站点/作品管理、匹配查询与重新认证，以及可选的前端静态托管。

pub mod handlers;
pub mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use axum::Router;
use axum::routing::{get, post, put};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::core::config::ServerConfig;

pub use handlers::AppState;

/// 构建路由；`/api/*` 下未匹配的路径返回 404，不落入前端
pub fn create_router(state: AppState, frontend_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/sites", get(handlers::list_sites).post(handlers::create_site))
        .route("/sites/{id}", put(handlers::update_site).delete(handlers::delete_site))
        .route("/sites/{id}/reauth", post(handlers::reauth_site))
        .route("/series", get(handlers::list_series).post(handlers::create_series))
        .route("/series/{id}", put(handlers::update_series).delete(handlers::delete_series))
        .route("/matches", get(handlers::list_matches))
        .fallback(handlers::not_found);

    let router = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .with_state(state);

    match frontend_dir {
        Some(dir) if dir.join("index.html").is_file() => {
            info!("托管前端静态文件: {}", dir.display());
            let spa = ServeDir::new(dir).not_found_service(ServeFile::new(dir.join("index.html")));
            router.fallback_service(spa)
        }
        Some(dir) => {
            warn!("前端目录缺少 index.html，已跳过静态托管: {}", dir.display());
            router
        }
        None => router,
    }
}

/// 启动 HTTP 服务，直到 `shutdown` 完成
pub async fn serve(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Invalid HTTP listen address")?;

    let mut app = create_router(state, config.frontend_dir.as_deref().map(Path::new));
    if config.cors {
        app = app.layer(CorsLayer::permissive());
    }
    app = app.layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&addr)
        .await
        .context("Failed to bind HTTP server")?;
    info!("HTTP 服务已启动: http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    info!("HTTP 服务已关闭");
    Ok(())
}
