use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::common::upload::stream_to_file;
use crate::infrastructure::storage::artifacts::{DOWNLOAD_FILE_NAME, ResultBlob};
use crate::modules::job::dto::*;
use crate::modules::job::readiness::ReadinessReport;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{
        Multipart, Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up", body = String)),
    tag = "Compressor"
)]
pub async fn health() -> &'static str {
    "ok"
}

#[utoipa::path(
    get,
    path = "/api/v1/readiness",
    responses(
        (status = 200, description = "Readiness report", body = ApiResponse<ReadinessReport>),
        (status = 503, description = "Readiness check has not finished")
    ),
    tag = "Compressor"
)]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.readiness().await {
        Some(report) => ApiSuccess(
            ApiResponse::success(report, "Readiness retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        None => ApiError(
            "Readiness check has not finished".to_string(),
            StatusCode::SERVICE_UNAVAILABLE,
        )
        .into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/ui",
    responses((status = 200, description = "Current page state", body = ApiResponse<UiSnapshot>)),
    tag = "Compressor"
)]
pub async fn ui(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.coordinator.snapshot().await;
    ApiSuccess(
        ApiResponse::success(snapshot, "UI state retrieved successfully"),
        StatusCode::OK,
    )
}

/// Pushes a `UiSnapshot` on connect and after every change.
#[utoipa::path(
    get,
    path = "/api/v1/ws",
    responses((status = 101, description = "Switching to WebSocket")),
    tag = "Compressor"
)]
pub async fn ws(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| push_snapshots(state, socket))
}

async fn push_snapshots(state: AppState, mut socket: WebSocket) {
    let mut updates = state.coordinator.subscribe();
    let mut snapshot = state.coordinator.snapshot().await;

    loop {
        let text = match serde_json::to_string(&snapshot) {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to serialize UI snapshot: {}", e);
                return;
            }
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            debug!("WebSocket client went away");
            return;
        }

        snapshot = tokio::select! {
            update = updates.recv() => match update {
                Ok(s) => s,
                // Only the latest state matters.
                Err(RecvError::Lagged(_)) => state.coordinator.snapshot().await,
                Err(RecvError::Closed) => return,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            },
        };
    }
}

/// Select the input video
/// Multipart field `video`; the file is kept until another one is selected.
#[utoipa::path(
    post,
    path = "/api/v1/file",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File selected", body = ApiResponse<SelectFileResponse>),
        (status = 400, description = "Bad Request"),
        (status = 503, description = "Tool disabled")
    ),
    tag = "Compressor"
)]
pub async fn select_file(State(state): State<AppState>, mut multipart: Multipart) -> impl IntoResponse {
    while let Some(field) = multipart.next_field().await.unwrap_or(None) {
        if field.name() != Some("video") {
            continue;
        }

        let file = match stream_to_file(field, &state.config.uploads_dir()).await {
            Ok(f) => f,
            Err(e) => {
                return ApiError::bad_request(format!("Upload failed: {}", e)).into_response();
            }
        };

        return match state.coordinator.select_file(file).await {
            Ok(res) => ApiSuccess(
                ApiResponse::success(res, "File selected successfully"),
                StatusCode::OK,
            )
            .into_response(),
            Err(e) => ApiError::from(e).into_response(),
        };
    }

    ApiError::bad_request("No video field found in multipart request").into_response()
}

#[utoipa::path(
    post,
    path = "/api/v1/compress",
    responses(
        (status = 202, description = "Compression started", body = ApiResponse<JobAccepted>),
        (status = 400, description = "No file selected"),
        (status = 409, description = "A job is already active"),
        (status = 503, description = "Tool disabled")
    ),
    tag = "Compressor"
)]
pub async fn compress(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.start_compression().await {
        Ok(res) => ApiSuccess(
            ApiResponse::success(res, "Compression started"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/cancel",
    responses(
        (status = 200, description = "Compression canceled"),
        (status = 409, description = "No compression job is active")
    ),
    tag = "Compressor"
)]
pub async fn cancel(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.cancel().await {
        Ok(()) => ApiSuccess(
            ApiResponse::success((), "Compression canceled"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/performance-test",
    responses(
        (status = 202, description = "Performance test started", body = ApiResponse<JobAccepted>),
        (status = 409, description = "A job is already active"),
        (status = 503, description = "Tool disabled")
    ),
    tag = "Compressor"
)]
pub async fn performance_test(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.run_performance_test().await {
        Ok(res) => ApiSuccess(
            ApiResponse::success(res, "Performance test started"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Body stream that owns the result file until the response is finished.
struct DownloadStream {
    inner: ReaderStream<tokio::fs::File>,
    _blob: ResultBlob,
}

impl Stream for DownloadStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Download the compressed video
/// Each result can be downloaded once; it is released afterwards.
#[utoipa::path(
    get,
    path = "/api/v1/downloads/{id}",
    params(
        ("id" = Uuid, Path, description = "Download ID")
    ),
    responses(
        (status = 200, description = "Compressed video"),
        (status = 404, description = "Unknown or already downloaded")
    ),
    tag = "Compressor"
)]
pub async fn download(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(blob) = state.downloads.take(id).await else {
        return ApiError::not_found("Download not found").into_response();
    };
    state.coordinator.download_claimed(id).await;

    let file = match tokio::fs::File::open(blob.path()).await {
        Ok(f) => f,
        Err(e) => {
            warn!("Result file for download {} is unreadable: {}", id, e);
            return ApiError::not_found("Download not found").into_response();
        }
    };

    info!("Serving download {} ({} bytes)", id, blob.size);
    let builder = axum::response::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, blob.mime)
        .header(header::CONTENT_LENGTH, blob.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{DOWNLOAD_FILE_NAME}\""),
        );

    let body = Body::from_stream(DownloadStream {
        inner: ReaderStream::new(file),
        _blob: blob,
    });

    builder
        .body(body)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
