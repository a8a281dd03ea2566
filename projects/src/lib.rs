pub mod api;
pub mod config;
pub mod contentful;
pub mod metrics_defs;
pub mod releases;
pub mod repository;
pub mod snapshot;
pub mod source;
pub mod types;

#[cfg(test)]
mod testutils;

use contentful::DocumentationOperations;
use contentful::backend::{BackendError, ContentfulBackend};
use repository::ProjectRepository;
use shared::admin_service::AdminService;
use shared::http::{ListenerError, run_http_service};
use source::{GithubSource, SourceError};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ProjectsError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ValidationError),
    #[error("could not create source client: {0}")]
    Source(#[from] SourceError),
    #[error("could not create content backend client: {0}")]
    Backend(#[from] BackendError),
    #[error("initial project load failed: {0}")]
    InitialLoad(#[from] snapshot::LoadError),
    #[error("API listener failed: {0}")]
    Serve(#[from] api::ServeError),
    #[error("admin listener failed: {0}")]
    Admin(#[from] ListenerError),
}

/// Loads the first snapshot, then serves the project API and the admin
/// endpoints until either listener fails or the process receives Ctrl-C.
///
/// On shutdown, writes waiting out a content backend rate limit are woken so
/// they retry at once while in-flight requests drain.
pub async fn run(config: config::Config) -> Result<(), ProjectsError> {
    config.validate()?;

    let source = Arc::new(GithubSource::new(&config.github)?);
    let repository = ProjectRepository::initialize(source).await?;

    let backend = Arc::new(ContentfulBackend::new(&config.contentful)?);
    let documentation = DocumentationOperations::new(backend);
    let interrupt = documentation.interrupt_handle();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down, interrupting rate-limit waits");
        interrupt.notify_waiters();
    };

    let readiness = repository.clone();
    let admin_service: AdminService<_, ListenerError> =
        AdminService::new(move || readiness.is_ready());

    let state = api::AppState::new(repository, documentation);

    tokio::select! {
        result = api::serve(&config.listener, state, shutdown) => result?,
        result = run_http_service(
            &config.admin_listener.host,
            config.admin_listener.port,
            admin_service,
        ) => result?,
    }

    Ok(())
}
