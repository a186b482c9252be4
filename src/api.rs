use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::domain::Article;
use crate::pipeline::Pipeline;
use crate::TARGET_WEB_REQUEST;

/// Recent-cluster reads are capped at this many stories.
const CLUSTER_READ_LIMIT: i64 = 20;
/// Clusters within this window are served to readers.
const CLUSTER_READ_WINDOW_HOURS: i64 = 24;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub pipeline: Arc<Pipeline>,
}

/// Run the HTTP server until shutdown is requested.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/api/news/ingest", post(ingest_articles))
        .route("/api/news/process", post(trigger_pipeline))
        .route("/api/news/clusters", get(recent_clusters))
        .route("/api/news/clusters/{cluster_id}/articles", get(cluster_articles))
        .route("/api/news/proxy", get(proxy_feed))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested; finishing in-flight work");
}

/// Accept a batch of ingested articles. An empty array is a valid ingest:
/// upstream fetch failures arrive here as nothing at all.
async fn ingest_articles(
    State(state): State<AppState>,
    Json(mut articles): Json<Vec<Article>>,
) -> Response {
    for article in articles.iter_mut() {
        if article.id.is_empty() {
            article.id = Article::id_for_url(&article.url);
        }
    }

    match state.db.upsert_articles(&articles).await {
        Ok(count) => Json(json!({ "success": true, "ingested": count })).into_response(),
        Err(e) => {
            error!(target: TARGET_WEB_REQUEST, "Article ingest failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Run one full pipeline cycle.
async fn trigger_pipeline(State(state): State<AppState>) -> Response {
    match state.pipeline.run().await {
        Ok(summary) => Json(json!({
            "success": true,
            "clustersGenerated": summary.clusters_generated,
        }))
        .into_response(),
        Err(e) => {
            error!(target: TARGET_WEB_REQUEST, "Pipeline run failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Recent clusters, newest first.
async fn recent_clusters(State(state): State<AppState>) -> Response {
    match state
        .db
        .load_recent_clusters(CLUSTER_READ_WINDOW_HOURS, CLUSTER_READ_LIMIT)
        .await
    {
        Ok(clusters) => Json(clusters).into_response(),
        Err(e) => {
            error!(target: TARGET_WEB_REQUEST, "Cluster read failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Member articles of one cluster, newest publication first.
async fn cluster_articles(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Response {
    match state.db.load_cluster_articles(&cluster_id).await {
        Ok(articles) => Json(articles).into_response(),
        Err(e) => {
            error!(target: TARGET_WEB_REQUEST, "Cluster member read failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
struct ProxyQuery {
    url: String,
}

/// Fetch an upstream feed on behalf of the browser, which cannot cross
/// origins itself. The body streams through untouched.
async fn proxy_feed(Query(query): Query<ProxyQuery>) -> Response {
    let client = match reqwest::Client::builder().gzip(true).build() {
        Ok(client) => client,
        Err(e) => {
            error!(target: TARGET_WEB_REQUEST, "Failed to build proxy client: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let upstream = client
        .get(&query.url)
        .header(
            header::USER_AGENT,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::PRAGMA, "no-cache")
        .send()
        .await;

    match upstream {
        Ok(resp) => {
            let status =
                StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();

            Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CACHE_CONTROL, "no-cache")
                .body(Body::from_stream(resp.bytes_stream()))
                .unwrap_or_else(|e| {
                    error!(target: TARGET_WEB_REQUEST, "Failed to build proxy response: {}", e);
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                })
        }
        Err(e) => {
            warn!(target: TARGET_WEB_REQUEST, "Proxy fetch of {} failed: {}", query.url, e);
            (StatusCode::BAD_GATEWAY, format!("Upstream fetch failed: {}", e)).into_response()
        }
    }
}
