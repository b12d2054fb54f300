use std::sync::Arc;

use anyhow::Context;

use hms_api::app::{self, AppState};
use hms_api::config::AppConfig;
use hms_auth::InMemoryCredentialStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hms_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let store = Arc::new(InMemoryCredentialStore::new());
    let state = AppState::from_config(&config, store.clone()).context("failed to set up token signing")?;

    if let Some(seed) = &config.seed_admin {
        app::seed_admin(&store, seed)
            .await
            .context("failed to seed administrator")?;
    }

    let app = app::build_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, production = config.production, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
