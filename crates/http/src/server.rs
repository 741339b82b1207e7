//! Server bootstrap: bind configuration from the environment, startup
//! hooks, then the axum serve loop with graceful shutdown.

use waypoint_core::Api;

use crate::adapter::build_router;

/// Listener configuration, read from `WAYPOINT_HOST` / `WAYPOINT_PORT`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8005,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("WAYPOINT_HOST").unwrap_or_else(|_| {
            tracing::warn!("WAYPOINT_HOST not set; binding loopback only");
            defaults.host
        });
        let port = std::env::var("WAYPOINT_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.port);
        Self { host, port }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builds the router for `api`, runs its startup hooks, and serves until
/// interrupted.
pub async fn serve(api: &mut Api, config: ServerConfig) -> anyhow::Result<()> {
    let app = build_router(api);
    let hooks: Vec<_> = api.http().startup_handlers().to_vec();
    for hook in hooks {
        hook().await;
    }

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    tracing::info!(
        api = %api.name(),
        addr = %listener.local_addr()?,
        version = env!("CARGO_PKG_VERSION"),
        "serving"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install shutdown signal handler");
    }
}
