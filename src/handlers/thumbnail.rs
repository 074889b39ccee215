//! # Thumbnail Serving Handler
//!
//! GET /api/thumbnails/{token}/{*file_id}?w=300&h=300&flags=center,png
//!
//! Produces (or fetches from cache) a thumbnail of the original identified by
//! `file_id` and serves it. Failures are answered with a placeholder image and
//! a status code describing the failure.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path as AxumPath, Query, Request, State, rejection::QueryRejection},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_http::services::ServeFile;
use tracing::{debug, error, instrument, warn};

use crate::{
    error::{ThumbError, ThumbResult},
    models::{AppState, OptionFlag},
};

#[derive(Debug, Deserialize)]
pub struct ThumbnailQuery {
    pub w: u32,
    pub h: u32,
    /// Comma-separated resample flags, e.g. `center,png`.
    #[serde(default)]
    pub flags: String,
}

/// Serves a thumbnail for `file_id`.
///
/// # Returns
///
/// - `200 OK` with the thumbnail - Served from cache or freshly generated
/// - `400 Bad Request` - Missing/invalid query or invalid dimensions
/// - `404 Not Found` - Wrong token or missing source (placeholder body)
/// - `422 Unprocessable Entity` - Source is not a decodable image
/// - `500 Internal Server Error` - Encoding or cache write failed
/// - `503 Service Unavailable` - Generation did not finish in time
#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4(), file_id = %file_id))]
pub async fn serve_thumbnail(
    State(state): State<Arc<AppState>>,
    AxumPath((token, file_id)): AxumPath<(String, String)>,
    query: Result<Query<ThumbnailQuery>, QueryRejection>,
    req: Request<Body>,
) -> Response {
    match thumbnail_response(&state, &token, &file_id, query, req).await {
        Ok(res) => res,
        Err(e) => {
            if let Some(reason) = e.fallback_reason() {
                state.fallback.handle(reason, &file_id);
            }
            e.into_response()
        }
    }
}

async fn thumbnail_response(
    state: &AppState,
    token: &str,
    file_id: &str,
    query: Result<Query<ThumbnailQuery>, QueryRejection>,
    req: Request<Body>,
) -> ThumbResult<Response> {
    if token != state.preview_token {
        warn!("Invalid preview token");
        return Err(ThumbError::TokenInvalid);
    }

    let Query(query) = query.map_err(|e| {
        debug!(error = %e, "Rejected thumbnail query");
        ThumbError::BadRequest("query must contain numeric `w` and `h`")
    })?;
    let flags = OptionFlag::parse_list(&query.flags);

    // Only the request head matters to the file server
    let (parts, _) = req.into_parts();

    let path = state
        .coordinator
        .get_or_create_thumbnail(file_id, query.w, query.h, &flags)
        .await?;
    if let Some(res) = serve_artifact(&path, &parts).await? {
        return Ok(res);
    }

    // Maintenance removed the artifact after it was looked up; the store no
    // longer indexes it, so this regenerates
    debug!(path = %path.display(), "Artifact vanished before serving, retrying");
    let path = state
        .coordinator
        .get_or_create_thumbnail(file_id, query.w, query.h, &flags)
        .await?;
    serve_artifact(&path, &parts).await?.ok_or_else(|| {
        error!(path = %path.display(), "Artifact vanished twice before serving");
        ThumbError::EncodeFailed("artifact disappeared before it could be served".to_string())
    })
}

/// Streams the artifact at `path`. `None` means the file no longer exists.
async fn serve_artifact(path: &Path, parts: &Parts) -> ThumbResult<Option<Response>> {
    let mut req = Request::new(Body::empty());
    *req.method_mut() = parts.method.clone();
    *req.uri_mut() = parts.uri.clone();
    *req.headers_mut() = parts.headers.clone();

    let mut service = ServeFile::new(path);
    let res = service.try_call(req).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to serve thumbnail");
        ThumbError::EncodeFailed("artifact could not be read".to_string())
    })?;

    if res.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !res.status().is_success() && !res.status().is_redirection() {
        warn!(status = %res.status(), "Thumbnail serving returned non-success status");
    }
    Ok(Some(res.into_response()))
}
