//! Screenloom HTTP 服务
//!
//! 启动: cargo run --bin screenloom-web --features web
//!
//! - POST /api/generate：请求体为 GenerateRequest，响应为 NDJSON 事件流（首行 run_started 带 runId）
//! - POST /api/runs/:id/cancel：取消进行中的运行
//! - GET /api/health
//!
//! 客户端断开时响应流被丢弃，DropGuard 随之取消运行。

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use tracing::{info, warn};

use screenloom::config::load_config;
use screenloom::core::{GenerateRequest, PipelineError};
use screenloom::observability;
use screenloom::runtime::Pipeline;

struct AppState {
    pipeline: Pipeline,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let pipeline = Pipeline::from_config(&cfg);
    let supervisor = pipeline.supervisor().clone();
    let state = Arc::new(AppState { pipeline });

    let app = Router::new()
        .route("/api/generate", post(api_generate))
        .route("/api/runs/:id/cancel", post(api_cancel_run))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(Arc::clone(&state));

    let addr: std::net::SocketAddr = cfg
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind address: {}", cfg.server.bind))?;
    info!("Screenloom web: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down, cancelling active runs");
            supervisor.cancel_all();
        })
        .await?;

    Ok(())
}

/// POST /api/generate：单轮运行，逐行推送事件
async fn api_generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, (StatusCode, String)> {
    let handle = match state.pipeline.start_run(req).await {
        Ok(handle) => handle,
        Err(PipelineError::EmptyPrompt) => {
            return Err((StatusCode::BAD_REQUEST, "prompt is required".to_string()))
        }
        Err(e) => return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    let run_id = handle.run_id.clone();
    let (events, join) = handle.split();
    let guard = join.cancel.clone().drop_guard();

    tokio::spawn(async move {
        let run_id = join.run_id.clone();
        match join.join().await {
            Ok(outcome) => info!(run_id = %run_id, status = ?outcome.status, "Run ended"),
            Err(e) => warn!(run_id = %run_id, error = %e, "Run ended with error"),
        }
    });

    let body = stream::unfold((events, Some(guard)), |(mut rx, guard)| async move {
        match rx.recv().await {
            Some(event) => Some((
                Ok::<_, Infallible>(Bytes::from(event.to_ndjson())),
                (rx, guard),
            )),
            None => {
                // 正常结束不触发取消
                if let Some(guard) = guard {
                    let _ = guard.disarm();
                }
                None
            }
        }
    });

    let mut res = Response::new(Body::from_stream(body));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        "application/x-ndjson; charset=utf-8".parse().unwrap(),
    );
    if let Ok(value) = run_id.parse::<header::HeaderValue>() {
        res.headers_mut().insert("x-run-id", value);
    }
    Ok(res)
}

/// POST /api/runs/:id/cancel
async fn api_cancel_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    if state.pipeline.supervisor().cancel(&run_id).await {
        info!(run_id = %run_id, "Run cancelled by client");
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "runId": run_id, "cancelled": true })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "runId": run_id, "cancelled": false })),
        )
    }
}
