//! HTTP handlers serving virtual files out of the bucket file system.
//! Bodies are streamed from the opened file; caching headers come from the
//! directives computed when the file is opened.

use crate::{
    errors::AppError,
    services::{
        file_system::FileStream,
        virtual_file::{CacheDirectives, VirtualFile},
    },
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use std::io::Cursor;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Resolve a request path to a virtual file, or 404 when the bucket lacks it.
///
/// The payload and its modification time come from one `read_file` call,
/// so the ETag always describes the bytes that are served.
async fn resolve(state: &AppState, path: &str) -> Result<VirtualFile, AppError> {
    let object = state.fs.read_file(path).await?;
    let bytes = object.bytes;
    Ok(VirtualFile::new(path, object.last_modified, move || async move {
        Ok(Box::new(Cursor::new(bytes)) as FileStream)
    }))
}

/// GET `{mount}/{*path}` streams a file with caching headers.
pub async fn get_virtual_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let file = resolve(&state, &path).await?;
    debug!("serving {}", file.virtual_path());
    let opened = file.open().await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(opened.stream)));
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &path, &opened.directives);
    Ok(response)
}

/// HEAD `{mount}/{*path}` returns the same headers as GET without fetching the body.
pub async fn head_virtual_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let info = state.fs.stat(&path).await?;
    let directives = CacheDirectives::for_file(info.last_modified, Utc::now());

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &path, &directives);
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(info.size));
    Ok(response)
}

fn set_file_headers(headers: &mut HeaderMap, path: &str, directives: &CacheDirectives) {
    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    if let Ok(value) = HeaderValue::from_str(&directives.cache_control()) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Ok(value) = HeaderValue::from_str(&directives.expires_header()) {
        headers.insert(header::EXPIRES, value);
    }
    if let Ok(value) = HeaderValue::from_str(&directives.etag.to_string()) {
        headers.insert(header::ETAG, value);
    }
}
