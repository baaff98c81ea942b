//! HTTP surface of the service.
//!
//! Thin axum layer over [`DownloadService`]: job submission, listing, deletion,
//! file download, cookie management, and the SSE event stream at `/api/sse`.
//! Runs on WEB_PORT (default 3000).

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{delete, get, post},
    Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;

use crate::core::config;
use crate::core::error::AppError;
use crate::core::metrics;
use crate::core::types::{JobId, JobStatus};
use crate::download::DownloadService;
use crate::events::ChannelEvent;
use crate::storage::DeleteOutcome;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody {
    url: Option<String>,
    #[serde(default)]
    high_quality: bool,
}

#[derive(Debug, Deserialize)]
struct CookiesBody {
    cookies: Option<String>,
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"success": false, "message": message.into()}))).into_response()
}

/// Builds the application router
pub fn router(service: DownloadService) -> Router {
    Router::new()
        .route("/api/sse", get(sse_handler))
        .route("/api/videos", get(list_videos_handler))
        .route("/api/video", post(submit_handler))
        .route("/api/video/{id}", delete(delete_handler))
        .route("/api/download/{id}", get(download_handler))
        .route("/api/cookies", get(get_cookies_handler).put(put_cookies_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Start the web server; returns when Ctrl+C is received.
pub async fn start_web_server(port: u16, service: DownloadService) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(service);

    log::info!("Starting web server on http://{}", addr);
    log::info!("  /api/sse             - Event stream (lifecycle, progress)");
    log::info!("  /api/video           - Submit a download (POST)");
    log::info!("  /api/videos          - List jobs");
    log::info!("  /api/video/{{id}}      - Delete a job (DELETE)");
    log::info!("  /api/download/{{id}}   - Download the file");
    log::info!("  /api/cookies         - Read/replace cookies (GET/PUT)");
    log::info!("  /health, /metrics");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutdown signal received, stopping web server");
        })
        .await?;

    Ok(())
}

fn to_sse_event(event: &ChannelEvent) -> Event {
    match event.payload_json() {
        Ok(json) => Event::default().event(event.name()).data(json),
        Err(e) => {
            log::error!("Failed to encode {} event for job {}: {}", event.name(), event.job_id(), e);
            Event::default().comment("encode error")
        }
    }
}

/// GET /api/sse
///
/// One subscription per connection, dropped with the connection.
async fn sse_handler(State(service): State<DownloadService>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = service.events().subscribe();
    log::debug!("SSE client connected (subscriber {})", subscription.id());

    let stream = subscription
        .into_stream()
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(config::events::keep_alive()))
}

/// GET /api/videos
async fn list_videos_handler(State(service): State<DownloadService>) -> Response {
    match service.list_jobs() {
        Ok(jobs) => Json(json!({"success": true, "data": jobs})).into_response(),
        Err(e) => {
            log::error!("Failed to list jobs: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.user_message())
        }
    }
}

/// POST /api/video with `{url, highQuality?}`
async fn submit_handler(
    State(service): State<DownloadService>,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return failure(StatusCode::BAD_REQUEST, "Provide a valid youtube url");
    };
    let url = body.url.unwrap_or_default();
    if url.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Provide a valid youtube url");
    }

    match service.submit(&url, body.high_quality).await {
        Ok(job) => Json(json!({
            "success": true,
            "message": "Video is processing",
            "data": job,
        }))
        .into_response(),
        Err(e @ AppError::Validation(_)) => failure(StatusCode::BAD_REQUEST, e.user_message()),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.user_message()),
    }
}

/// DELETE /api/video/{id}
async fn delete_handler(
    State(service): State<DownloadService>,
    id: Result<Path<JobId>, PathRejection>,
) -> Response {
    let Ok(Path(id)) = id else {
        return failure(StatusCode::BAD_REQUEST, "Provide a valid video id");
    };

    let outcome = service.delete_job(id);
    let status = match &outcome {
        DeleteOutcome::NotFound => StatusCode::NOT_FOUND,
        DeleteOutcome::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DeleteOutcome::Deleted { .. } => StatusCode::OK,
    };
    (
        status,
        Json(json!({"success": outcome.success(), "message": outcome.message()})),
    )
        .into_response()
}

/// GET /api/download/{id}: streams the file as an attachment
async fn download_handler(
    State(service): State<DownloadService>,
    id: Result<Path<JobId>, PathRejection>,
) -> Response {
    let Ok(Path(id)) = id else {
        return failure(StatusCode::BAD_REQUEST, "Provide a valid video id");
    };

    let job = match service.find_job(id) {
        Ok(Some(job)) => job,
        Ok(None) => return failure(StatusCode::NOT_FOUND, "Video not found"),
        Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, e.user_message()),
    };

    let path = service.job_file_path(&job);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            log::warn!("File for job {} is not available ({}): {}", id, path.display(), e);
            return failure(StatusCode::NOT_FOUND, "Video not found");
        }
    };
    let length = file.metadata().await.map(|m| m.len()).ok();

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", job.title.replace('"', "")),
        );
    if let Some(length) = length {
        response = response.header(header::CONTENT_LENGTH, length);
    }

    match response.body(Body::from_stream(ReaderStream::new(file))) {
        Ok(response) => response,
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/cookies
async fn get_cookies_handler(State(service): State<DownloadService>) -> Response {
    match service.cookies().read().await {
        Ok(content) => Json(json!({"success": true, "data": content})).into_response(),
        Err(AppError::CookiesMissing) => Json(json!({"success": true, "data": "No cookies found"})).into_response(),
        Err(e) => {
            log::error!("Failed to read cookies: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.user_message())
        }
    }
}

/// PUT /api/cookies with `{cookies}`
async fn put_cookies_handler(
    State(service): State<DownloadService>,
    body: Result<Json<CookiesBody>, JsonRejection>,
) -> Response {
    let Some(cookies) = body.ok().and_then(|Json(body)| body.cookies) else {
        return failure(StatusCode::BAD_REQUEST, "Missing cookies text");
    };

    match service.cookies().write(&cookies).await {
        Ok(_) => Json(json!({"success": true})).into_response(),
        Err(e) => {
            log::error!("Failed to store cookies: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.user_message())
        }
    }
}

/// GET /health
async fn health_handler(State(service): State<DownloadService>) -> Response {
    Json(json!({
        "status": "ok",
        "runningJobs": service.supervisor().active_jobs().len(),
        "subscribers": service.events().subscriber_count(),
        "pendingJobs": service.count_jobs(JobStatus::Pending).ok(),
        "cookies": service.cookies().exists().await,
    }))
    .into_response()
}

/// GET /metrics (Prometheus text format)
async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode metrics: {}", e)).into_response()
        }
    }
}
