//! Shared state handed to every HTTP handler.

use crate::services::file_system::BucketFileSystem;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// The file system every request is served from.
    pub fs: Arc<BucketFileSystem>,
}

impl AppState {
    pub fn new(fs: Arc<BucketFileSystem>) -> Self {
        Self { fs }
    }
}
