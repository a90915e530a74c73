#[cfg(test)]
#[path = "server_test.rs"]
mod tests;

use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendName;
use crate::domain::services::FlowSettings;
use crate::domain::services::SessionStore;
use crate::domain::services::UiFlows;
use crate::infrastructure::backends::BackendManager;
use crate::infrastructure::transport::a2a::AgentCard;
use crate::infrastructure::transport::router;
use crate::infrastructure::transport::AppState;

pub fn build_app(state: AppState) -> Router {
    return router(state).layer(CorsLayer::permissive());
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?err, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

pub async fn start() -> Result<()> {
    let backend_str = Config::get(ConfigKey::Backend);
    let backend_name = match BackendName::parse(backend_str.to_string()) {
        Some(backend_name) => backend_name,
        None => bail!(format!("Unknown backend '{backend_str}'")),
    };

    let backend = BackendManager::get(backend_name)?;
    if let Err(err) = backend.health_check().await {
        tracing::warn!(backend = %backend_name, error = ?err, "Backend health check failed, continuing");
    }

    let settings = FlowSettings::from_config()?;
    tracing::info!(
        backend = %backend_name,
        model = Config::get(ConfigKey::Model),
        protocol = %settings.protocol,
        "Flows ready"
    );

    let agent_card = AgentCard::new(&Config::agent_url(), settings.protocol);
    let flows = UiFlows::new(backend, Arc::new(SessionStore::default()), settings);
    let state = AppState::new(flows, agent_card);

    let addr = format!(
        "{}:{}",
        Config::get(ConfigKey::Host),
        Config::get(ConfigKey::Port)
    );
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = addr, agent_url = Config::agent_url(), "Server listening");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    return Ok(());
}
