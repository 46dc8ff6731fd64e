pub mod attachments;
pub mod capture;
pub mod config;
pub mod document;
pub mod providers;
pub mod proxy;
pub mod questions;
pub mod server;
pub mod telemetry;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{ServiceSettings, default_settings_path};
use crate::server::AppState;

/// Owns the settings and shared state behind the HTTP surface.
pub struct Workbench {
    settings: ServiceSettings,
    state: AppState,
}

impl Workbench {
    /// Construct a workbench using explicit settings.
    pub fn from_settings(settings: ServiceSettings) -> Result<Self> {
        let state = AppState::from_settings(&settings)?;
        info!(
            config = %state.providers.path().display(),
            questions = %state.questions.path().display(),
            attachments = %state.questions.attachments_root().display(),
            "workbench storage resolved"
        );
        Ok(Self { settings, state })
    }

    /// Load settings from the default or given path and build the workbench.
    pub fn bootstrap(settings_path_override: Option<PathBuf>) -> Result<Self> {
        let settings_path = match settings_path_override {
            Some(path) => path,
            None => default_settings_path()?,
        };
        let settings = ServiceSettings::load_or_default(&settings_path)?;
        Self::from_settings(settings)
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        server::router(self.state.clone(), self.settings.max_body_bytes)
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.settings.listen_socket()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        server::serve(listener, self.router(), shutdown).await
    }
}
