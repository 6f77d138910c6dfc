use anyhow::{Context, Result};
use bucket_fs::config::AppConfig;
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args().context("loading bucket file system settings")?;

    tracing::info!("Starting bucket-fs with config: {:?}", cfg);
    tracing::info!(
        "Bucket `{}` in {} under prefix `{}`",
        cfg.storage.bucket_name,
        cfg.storage.region,
        cfg.storage.bucket_prefix
    );

    // --- Initialize core service ---
    let fs = bucket_fs::build_file_system(&cfg).await?;
    if cfg.storage.disable_virtual_path_provider {
        tracing::info!("Virtual path serving disabled; files are served from their bucket URLs");
    } else {
        tracing::info!("Serving files under {}/", cfg.mount_path);
    }

    // --- Build router ---
    let app = bucket_fs::app(&cfg, fs);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
