// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP host for the resource engine

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use redfish_core::application::RedfishEngine;
use redfish_core::domain::server_config::ServerConfig;
use redfish_core::presentation::router;

/// Command-line values that win over the configuration file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Overrides {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

pub async fn serve(config_path: Option<PathBuf>, overrides: Overrides) -> Result<()> {
    let mut config = ServerConfig::load_or_default(config_path).context("Failed to load configuration")?;
    overrides.apply(&mut config);
    config.validate().context("Configuration validation failed")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let prefix = config.server.path_prefix.clone();

    let engine = Arc::new(RedfishEngine::new(config).context("Failed to register engine components")?);
    engine.start().await.context("Failed to seed resources")?;

    let app = router(engine.clone());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(resources = engine.tree().len(), "Serving {} on {}", prefix, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Resource engine shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
