use crate::config::Listener as ListenerConfig;
use crate::contentful::retry::RetryError;
use crate::contentful::{DocumentationError, DocumentationOperations};
use crate::repository::{ProjectRepository, RepositoryError};
use crate::snapshot::LoadError;
use crate::types::{Project, ProjectDocumentation, ProjectSupport};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Documentation(#[from] DocumentationError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("a cache refresh is already in progress")]
    RefreshInProgress,
}

#[derive(Clone)]
pub struct AppState {
    repository: ProjectRepository,
    documentation: Arc<DocumentationOperations>,
    // The repository does not serialize refreshes itself
    refresh_permit: Arc<Semaphore>,
}

impl AppState {
    pub fn new(repository: ProjectRepository, documentation: DocumentationOperations) -> Self {
        AppState {
            repository,
            documentation: Arc::new(documentation),
            refresh_permit: Arc::new(Semaphore::new(1)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/{slug}", get(get_project))
        .route(
            "/projects/{slug}/releases",
            get(get_releases).post(add_release),
        )
        .route("/projects/{slug}/releases/{version}", delete(delete_release))
        .route("/projects/{slug}/generations", get(get_generations))
        .route("/projects/{slug}/support-policy", get(get_support_policy))
        .route("/refresh_cache", post(refresh_cache))
        .with_state(state)
}

/// Serves the API until `shutdown` completes, then waits for in-flight
/// requests to finish.
pub async fn serve<F>(
    listener: &ListenerConfig,
    state: AppState,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr, "Serving project API");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Project API stopped");
    Ok(())
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SupportPolicyResponse {
    support_policy: String,
}

async fn list_projects(State(state): State<AppState>) -> Json<Vec<Project>> {
    Json(state.repository.get_projects())
}

async fn get_project(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.repository.get_project(&slug)?))
}

async fn get_releases(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<ProjectDocumentation>>, ApiError> {
    Ok(Json(state.repository.get_project_documentations(&slug)?))
}

async fn get_generations(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<ProjectSupport>>, ApiError> {
    Ok(Json(state.repository.get_project_supports(&slug)?))
}

async fn get_support_policy(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<SupportPolicyResponse>, ApiError> {
    let support_policy = state.repository.get_project_support_policy(&slug)?;
    Ok(Json(SupportPolicyResponse { support_policy }))
}

async fn add_release(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(documentation): Json<ProjectDocumentation>,
) -> Result<StatusCode, ApiError> {
    state
        .documentation
        .add_documentation(&slug, documentation)
        .await?;
    Ok(StatusCode::CREATED)
}

async fn delete_release(
    State(state): State<AppState>,
    Path((slug, version)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .documentation
        .delete_documentation(&slug, &version)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_cache(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let _permit = state
        .refresh_permit
        .try_acquire()
        .map_err(|_| ApiError::RefreshInProgress)?;

    state.repository.refresh().await?;
    Ok(StatusCode::NO_CONTENT)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Repository(RepositoryError::ProjectNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Documentation(err) => match err {
                DocumentationError::ProjectNotFound(_)
                | DocumentationError::VersionNotFound { .. } => StatusCode::NOT_FOUND,
                DocumentationError::AmbiguousProject { .. } => StatusCode::CONFLICT,
                DocumentationError::InvalidEntry { .. } => StatusCode::BAD_GATEWAY,
                DocumentationError::Backend(RetryError::NonRetryable(_)) => StatusCode::BAD_GATEWAY,
                DocumentationError::Backend(RetryError::Exhausted { .. }) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
            ApiError::Load(_) => StatusCode::BAD_GATEWAY,
            ApiError::RefreshInProgress => StatusCode::CONFLICT,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(ApiErrorResponse {
            error_message: self.to_string(),
        });

        (status, body).into_response()
    }
}
