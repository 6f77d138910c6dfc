//! A hierarchical file system over a single object-store bucket, with a
//! local read-through cache and virtual-path serving over HTTP.

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use config::AppConfig;
use services::{
    disk_cache::{DiskCache, FileCache},
    file_system::BucketFileSystem,
    memory_client::MemoryObjectClient,
    object_client::ObjectStoreClient,
    s3_client::S3ObjectClient,
};
use state::AppState;

/// Construct the object-store client, the cache and the file system over them.
pub async fn build_file_system(cfg: &AppConfig) -> Result<Arc<BucketFileSystem>> {
    let storage = Arc::new(cfg.storage.clone());

    let client: Arc<dyn ObjectStoreClient> = if cfg.in_memory {
        tracing::warn!("Using an in-memory object store; files are lost on exit");
        Arc::new(MemoryObjectClient::new())
    } else {
        Arc::new(S3ObjectClient::from_config(&storage).await)
    };

    let cache = if storage.cache_enabled {
        let disk = DiskCache::new(&cfg.cache_dir, storage.cache_expiry()).with_context(|| {
            format!("creating cache directory {}", cfg.cache_dir.display())
        })?;
        tracing::info!(
            "Caching files in {} for {} minutes",
            cfg.cache_dir.display(),
            storage.cache_minutes
        );
        FileCache::Enabled(disk)
    } else {
        FileCache::Disabled
    };

    Ok(Arc::new(BucketFileSystem::new(storage, client, cache)))
}

/// Router over `fs`, serving virtual paths unless the configuration disables them.
pub fn app(cfg: &AppConfig, fs: Arc<BucketFileSystem>) -> Router {
    let mount = if cfg.storage.disable_virtual_path_provider {
        None
    } else {
        Some(cfg.mount_path.as_str())
    };
    routes::routes::routes(mount).with_state(AppState::new(fs))
}
