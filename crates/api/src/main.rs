use std::sync::Arc;

use anyhow::Context;

use woosync_infra::SyncConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    woosync_observability::init();

    let config = SyncConfig::from_env().context("invalid configuration")?;
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set; admin endpoints are unauthenticated");
    }

    let services = woosync_api::app::services::build_services(&config)?;
    let app = woosync_api::app::build_app(Arc::new(services), config.admin_token.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        mapping_file = %config.mapping_file.display(),
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
