//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the bucket and the cache directory

use crate::{services::disk_cache::FileCache, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

/// Path probed on the bucket; its absence is the expected answer.
const READINESS_PROBE_PATH: &str = ".readyz";

/// `GET /healthz`
///
/// Very small liveness probe. Never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Asks the bucket whether a probe key exists (any answer means reachable).
/// 2. Performs a write/read/delete in the cache directory when caching is on.
///
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let bucket_check = match state.fs.file_exists(READINESS_PROBE_PATH).await {
        Ok(_) => (true, None::<String>),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    let cache_check = match state.fs.cache() {
        FileCache::Enabled(cache) => {
            let tmp_path = cache.root().join(format!(".readyz-{}", Uuid::new_v4()));
            match fs::write(&tmp_path, b"readyz").await {
                Ok(_) => {
                    let read = fs::read(&tmp_path).await;
                    let _ = fs::remove_file(&tmp_path).await;
                    match read {
                        Ok(bytes) if bytes == b"readyz" => (true, None),
                        Ok(_) => (false, Some("file content mismatch".to_string())),
                        Err(e) => (false, Some(format!("could not read tmp file: {}", e))),
                    }
                }
                Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
            }
        }
        FileCache::Disabled => (true, Some("cache disabled".to_string())),
    };

    let overall_ok = bucket_check.0 && cache_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "bucket",
        CheckStatus {
            ok: bucket_check.0,
            error: bucket_check.1,
        },
    );
    checks.insert(
        "cache",
        CheckStatus {
            ok: cache_check.0,
            error: cache_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
