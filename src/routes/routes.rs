//! Defines routes for health checks and virtual-file serving.
//!
//! ## Structure
//! - `GET  /healthz` and `GET /readyz` probes
//! - `GET  {mount}/{*path}` streams a file with caching headers
//! - `HEAD {mount}/{*path}` returns the same headers without a body
//!
//! The file routes are left out when virtual-path serving is disabled;
//! files are then reached through their public bucket URLs instead.

use crate::{
    handlers::{
        file_handlers::{get_virtual_file, head_virtual_file},
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{Router, routing::get};

/// Build the router. `mount_path` is `None` when virtual paths are disabled,
/// otherwise a rooted path such as `/media` (or `""` to serve from the root).
pub fn routes(mount_path: Option<&str>) -> Router<AppState> {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz));

    match mount_path {
        Some(mount) => router.route(
            &format!("{}/{{*path}}", mount.trim_end_matches('/')),
            get(get_virtual_file).head(head_virtual_file),
        ),
        None => router,
    }
}
