use std::sync::Arc;

use anyhow::Context;

use settle_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("invalid configuration")?;
    settle_observability::init(config.log_format);

    let services = Arc::new(settle_api::app::services::build_services(config.clone()));
    let worker = services
        .settlement
        .spawn_job_worker()
        .context("failed to start collaborator job worker")?;

    let app = settle_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await;

    worker.shutdown();
    served.context("http server failed")
}
