use anyhow::Context;

use billforge_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    billforge_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let app = billforge_api::app::build_app(&config)
        .await
        .context("failed to initialize services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        cache_ttl_secs = config.profile_cache_ttl.as_secs(),
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
